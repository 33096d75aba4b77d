use std::collections::HashMap;

use super::domain::{ApplicationId, ApplicationStatus, MembershipApplication, User, UserId};

/// Storage abstraction over the `users` and `membership_applications` tables so the engine can be
/// exercised against SQLite or an in-memory fake.
pub trait MembershipStore: Send + Sync {
    /// All users ordered by id.
    fn list_users(&self) -> Result<Vec<User>, StoreError>;
    /// Every application currently stored, in id order.
    fn list_applications(&self) -> Result<Vec<MembershipApplication>, StoreError>;
    /// Creates one application. Returns [`StoreError::Conflict`] when the user already owns one.
    fn insert_application(
        &self,
        user_id: UserId,
        initial_status: &ApplicationStatus,
    ) -> Result<ApplicationId, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("membership application already exists for user {0}")]
    Conflict(UserId),
    #[error("required table '{0}' is missing")]
    MissingTable(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Index of existing applications keyed by owning user.
#[derive(Debug, Default, Clone)]
pub struct ExistingApplications {
    by_user: HashMap<UserId, Vec<ApplicationId>>,
}

impl ExistingApplications {
    pub fn contains(&self, user_id: UserId) -> bool {
        self.by_user.contains_key(&user_id)
    }

    pub fn insert(&mut self, user_id: UserId, application_id: ApplicationId) {
        self.by_user.entry(user_id).or_default().push(application_id);
    }

    /// Number of distinct users that own at least one application.
    pub fn owners(&self) -> usize {
        self.by_user.len()
    }

    /// Users referenced by more than one application, sorted by id.
    pub fn duplicate_owners(&self) -> Vec<UserId> {
        let mut owners: Vec<UserId> = self
            .by_user
            .iter()
            .filter(|(_, applications)| applications.len() > 1)
            .map(|(user_id, _)| *user_id)
            .collect();
        owners.sort();
        owners
    }
}

impl<'a> FromIterator<&'a MembershipApplication> for ExistingApplications {
    fn from_iter<T: IntoIterator<Item = &'a MembershipApplication>>(iter: T) -> Self {
        let mut index = Self::default();
        for application in iter {
            index.insert(application.user_id, application.id);
        }
        index
    }
}
