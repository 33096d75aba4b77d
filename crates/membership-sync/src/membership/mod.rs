//! Reconciliation of `users` against `membership_applications`.
//!
//! The engine reads both tables through a [`MembershipStore`], classifies every user with an
//! [`EligibilityPolicy`], and inserts the applications that are missing. Passes are append-only
//! and safe to repeat; concurrent passes rely on the store rejecting a second application for the
//! same user.

pub mod domain;
pub mod eligibility;
pub mod engine;
pub mod migrations;
pub mod report;
pub mod repository;
pub mod router;
pub(crate) mod schema;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use domain::{ApplicationId, ApplicationStatus, MembershipApplication, User, UserId};
pub use eligibility::{Eligibility, EligibilityPolicy, IneligibleReason, RoleEligibilityPolicy};
pub use engine::{
    create_membership_applications, CancellationFlag, ReconcileError, ReconciliationEngine,
    ReconciliationPlan,
};
pub use migrations::{MigrationError, MigrationOutcome, MigrationReport};
pub use report::{ReconciliationTally, UserOutcome};
pub use repository::{ExistingApplications, MembershipStore, StoreError};
pub use router::membership_router;
pub use sqlite::SqliteMembershipStore;
