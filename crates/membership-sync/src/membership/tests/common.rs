use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::membership::domain::{
    ApplicationId, ApplicationStatus, MembershipApplication, User, UserId,
};
use crate::membership::engine::CancellationFlag;
use crate::membership::repository::{MembershipStore, StoreError};

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    applications: Vec<MembershipApplication>,
    next_application_id: i64,
    failing_inserts: HashSet<UserId>,
    racing_inserts: HashSet<UserId>,
    unreadable_users: bool,
    unreadable_applications: bool,
    insert_attempts: Vec<UserId>,
    cancel_after_inserts: Option<(usize, CancellationFlag)>,
}

/// In-memory stand-in for the SQLite store with failure injection.
#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub(super) fn with_users(users: Vec<User>) -> Self {
        let store = Self::default();
        store.state.lock().expect("store mutex poisoned").users = users;
        store
    }

    pub(super) fn seed_application(&self, user_id: i64) {
        let mut state = self.state.lock().expect("store mutex poisoned");
        push_application(&mut state, UserId(user_id), ApplicationStatus::Approved);
    }

    /// Inserts for this user fail with a transient error.
    pub(super) fn fail_inserts_for(&self, user_id: i64) {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .failing_inserts
            .insert(UserId(user_id));
    }

    pub(super) fn heal_inserts(&self) {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .failing_inserts
            .clear();
    }

    /// Simulates another process inserting the row between snapshot and insert.
    pub(super) fn race_inserts_for(&self, user_id: i64) {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .racing_inserts
            .insert(UserId(user_id));
    }

    pub(super) fn break_user_listing(&self) {
        self.state.lock().expect("store mutex poisoned").unreadable_users = true;
    }

    pub(super) fn break_application_listing(&self) {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .unreadable_applications = true;
    }

    pub(super) fn cancel_after_inserts(&self, inserts: usize, flag: CancellationFlag) {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .cancel_after_inserts = Some((inserts, flag));
    }

    pub(super) fn applications(&self) -> Vec<MembershipApplication> {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .applications
            .clone()
    }

    pub(super) fn applications_for(&self, user_id: i64) -> usize {
        self.applications()
            .iter()
            .filter(|application| application.user_id == UserId(user_id))
            .count()
    }

    pub(super) fn insert_attempts(&self) -> Vec<UserId> {
        self.state
            .lock()
            .expect("store mutex poisoned")
            .insert_attempts
            .clone()
    }
}

fn push_application(
    state: &mut MemoryState,
    user_id: UserId,
    status: ApplicationStatus,
) -> ApplicationId {
    state.next_application_id += 1;
    let id = ApplicationId(state.next_application_id);
    state.applications.push(MembershipApplication {
        id,
        user_id,
        status,
        created_at: None,
        claimed_at: None,
    });
    id
}

impl MembershipStore for MemoryStore {
    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        if state.unreadable_users {
            return Err(StoreError::MissingTable("users"));
        }
        let mut users = state.users.clone();
        users.sort_by_key(|user| user.id);
        Ok(users)
    }

    fn list_applications(&self) -> Result<Vec<MembershipApplication>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        if state.unreadable_applications {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(state.applications.clone())
    }

    fn insert_application(
        &self,
        user_id: UserId,
        initial_status: &ApplicationStatus,
    ) -> Result<ApplicationId, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.insert_attempts.push(user_id);

        if state.failing_inserts.contains(&user_id) {
            return Err(StoreError::Unavailable("database is locked".to_string()));
        }
        if state.racing_inserts.remove(&user_id) {
            push_application(&mut state, user_id, initial_status.clone());
        }
        if state
            .applications
            .iter()
            .any(|application| application.user_id == user_id)
        {
            return Err(StoreError::Conflict(user_id));
        }

        let id = push_application(&mut state, user_id, initial_status.clone());

        let created = state
            .insert_attempts
            .iter()
            .filter(|attempt| !state.failing_inserts.contains(attempt))
            .count();
        if let Some((threshold, flag)) = &state.cancel_after_inserts {
            if created >= *threshold {
                flag.cancel();
            }
        }
        Ok(id)
    }
}

pub(super) fn teacher(id: i64) -> User {
    User::new(id)
        .with_role("teacher")
        .with_email(format!("teacher{id}@example.org"))
}

pub(super) fn guest(id: i64) -> User {
    User::new(id).with_role("guest")
}

/// Users 1..=3 from the canonical scenario: two teachers around a guest.
pub(super) fn scenario_users() -> Vec<User> {
    vec![teacher(1), guest(2), teacher(3)]
}
