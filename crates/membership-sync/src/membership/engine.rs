use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{ApplicationStatus, User, UserId};
use super::eligibility::{Eligibility, EligibilityPolicy, IneligibleReason};
use super::report::{ReconciliationTally, UserOutcome};
use super::repository::{ExistingApplications, MembershipStore, StoreError};

/// Cooperative stop signal checked between users.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Raised when the pass cannot start because a source table is unreadable.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to load users: {0}")]
    LoadUsers(#[source] StoreError),
    #[error("failed to load membership applications: {0}")]
    LoadApplications(#[source] StoreError),
}

/// Dry-run view of what a pass would do against the current table contents.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    pub to_create: Vec<UserId>,
    pub already_existing: Vec<UserId>,
    pub ineligible: Vec<(UserId, IneligibleReason)>,
    /// Users already holding more than one application. Reported only; never repaired here.
    pub duplicate_owners: Vec<UserId>,
}

impl ReconciliationPlan {
    /// Tally the pass would produce if every insert succeeded.
    pub fn projected_tally(&self) -> ReconciliationTally {
        ReconciliationTally {
            created: self.to_create.len(),
            already_existing: self.already_existing.len(),
            ineligible: self.ineligible.len(),
            ..ReconciliationTally::default()
        }
    }

    pub fn is_converged(&self) -> bool {
        self.to_create.is_empty()
    }
}

/// Brings `membership_applications` in line with `users`: every eligible user ends up owning
/// exactly one application. Existing rows are never touched.
pub struct ReconciliationEngine<S: ?Sized, P: ?Sized> {
    store: Arc<S>,
    policy: Arc<P>,
    initial_status: ApplicationStatus,
}

impl<S, P> ReconciliationEngine<S, P>
where
    S: MembershipStore + ?Sized,
    P: EligibilityPolicy + ?Sized,
{
    pub fn new(store: Arc<S>, policy: Arc<P>) -> Self {
        Self {
            store,
            policy,
            initial_status: ApplicationStatus::Pending,
        }
    }

    pub fn with_initial_status(mut self, status: ApplicationStatus) -> Self {
        self.initial_status = status;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Classifies every user against the current tables without writing anything.
    pub fn plan(&self) -> Result<ReconciliationPlan, ReconcileError> {
        let (users, existing) = load_snapshot(self.store.as_ref())?;

        let mut plan = ReconciliationPlan {
            duplicate_owners: existing.duplicate_owners(),
            ..ReconciliationPlan::default()
        };
        for user in &users {
            match self.policy.classify(user) {
                Eligibility::Ineligible(reason) => plan.ineligible.push((user.id, reason)),
                Eligibility::Eligible if existing.contains(user.id) => {
                    plan.already_existing.push(user.id)
                }
                Eligibility::Eligible => plan.to_create.push(user.id),
            }
        }

        Ok(plan)
    }

    /// Runs a full pass.
    pub fn run(&self) -> Result<ReconciliationTally, ReconcileError> {
        self.run_until(&CancellationFlag::default())
    }

    /// Runs a pass, stopping between users once `cancel` fires. Rows inserted before the stop
    /// stay committed.
    pub fn run_until(
        &self,
        cancel: &CancellationFlag,
    ) -> Result<ReconciliationTally, ReconcileError> {
        reconcile(
            self.store.as_ref(),
            self.policy.as_ref(),
            &self.initial_status,
            cancel,
        )
    }
}

/// One-shot pass with the default `pending` status and no cancellation.
pub fn create_membership_applications<S, P>(
    store: &S,
    policy: &P,
) -> Result<ReconciliationTally, ReconcileError>
where
    S: MembershipStore + ?Sized,
    P: EligibilityPolicy + ?Sized,
{
    reconcile(
        store,
        policy,
        &ApplicationStatus::Pending,
        &CancellationFlag::default(),
    )
}

fn load_snapshot<S>(store: &S) -> Result<(Vec<User>, ExistingApplications), ReconcileError>
where
    S: MembershipStore + ?Sized,
{
    let users = store.list_users().map_err(ReconcileError::LoadUsers)?;
    let applications = store
        .list_applications()
        .map_err(ReconcileError::LoadApplications)?;
    let existing: ExistingApplications = applications.iter().collect();

    let duplicates = existing.duplicate_owners();
    if !duplicates.is_empty() {
        warn!(
            count = duplicates.len(),
            users = ?duplicates,
            "users own more than one membership application"
        );
    }

    Ok((users, existing))
}

fn reconcile<S, P>(
    store: &S,
    policy: &P,
    initial_status: &ApplicationStatus,
    cancel: &CancellationFlag,
) -> Result<ReconciliationTally, ReconcileError>
where
    S: MembershipStore + ?Sized,
    P: EligibilityPolicy + ?Sized,
{
    let (users, mut existing) = load_snapshot(store)?;
    info!(
        users = users.len(),
        owners = existing.owners(),
        "starting membership reconciliation"
    );

    let mut tally = ReconciliationTally::default();
    for user in &users {
        if cancel.is_cancelled() {
            tally.cancelled = true;
            warn!(
                visited = tally.total(),
                remaining = users.len() - tally.total(),
                "membership reconciliation cancelled"
            );
            break;
        }

        let outcome = reconcile_user(store, policy, initial_status, &existing, user);
        if let UserOutcome::Created(application_id) = &outcome {
            existing.insert(user.id, *application_id);
        }
        tally.record(user.id, &outcome);
    }

    info!(
        created = tally.created,
        already_existing = tally.already_existing,
        ineligible = tally.ineligible,
        failed = tally.failed,
        "membership reconciliation finished"
    );
    Ok(tally)
}

fn reconcile_user<S, P>(
    store: &S,
    policy: &P,
    initial_status: &ApplicationStatus,
    existing: &ExistingApplications,
    user: &User,
) -> UserOutcome
where
    S: MembershipStore + ?Sized,
    P: EligibilityPolicy + ?Sized,
{
    if let Eligibility::Ineligible(reason) = policy.classify(user) {
        debug!(user_id = %user.id, %reason, "skipping ineligible user");
        return UserOutcome::Ineligible(reason);
    }

    if existing.contains(user.id) {
        return UserOutcome::AlreadyExisting;
    }

    match store.insert_application(user.id, initial_status) {
        Ok(application_id) => {
            debug!(user_id = %user.id, %application_id, "created membership application");
            UserOutcome::Created(application_id)
        }
        // Another writer got there between the snapshot and this insert.
        Err(StoreError::Conflict(_)) => {
            debug!(user_id = %user.id, "application appeared concurrently");
            UserOutcome::AlreadyExisting
        }
        Err(err) => {
            warn!(user_id = %user.id, error = %err, "failed to create membership application");
            UserOutcome::Failed(err.to_string())
        }
    }
}
