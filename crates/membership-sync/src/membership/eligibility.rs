use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::domain::User;

/// Classification of a single user for the reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "classification", content = "reason", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Why a user does not qualify for a membership application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    MissingRole,
    RoleNotEligible(String),
    BlockedStatus(String),
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IneligibleReason::MissingRole => write!(f, "role missing"),
            IneligibleReason::RoleNotEligible(role) => write!(f, "role '{role}' not eligible"),
            IneligibleReason::BlockedStatus(status) => {
                write!(f, "account status '{status}' blocks membership")
            }
        }
    }
}

/// Predicate deciding whether a user should own a membership application.
///
/// Implementations must be pure: the same record always yields the same answer, which is what
/// makes repeated passes converge.
pub trait EligibilityPolicy: Send + Sync {
    fn classify(&self, user: &User) -> Eligibility;
}

impl<F> EligibilityPolicy for F
where
    F: Fn(&User) -> Eligibility + Send + Sync,
{
    fn classify(&self, user: &User) -> Eligibility {
        self(user)
    }
}

/// Default policy: role allow-list plus account-status block-list, both case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleEligibilityPolicy {
    eligible_roles: BTreeSet<String>,
    blocked_statuses: BTreeSet<String>,
}

impl RoleEligibilityPolicy {
    pub const DEFAULT_BLOCKED_STATUSES: [&'static str; 3] = ["disabled", "suspended", "deleted"];

    pub fn new<I, S>(eligible_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            eligible_roles: normalize_all(eligible_roles),
            blocked_statuses: normalize_all(Self::DEFAULT_BLOCKED_STATUSES),
        }
    }

    pub fn with_blocked_statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blocked_statuses = normalize_all(statuses);
        self
    }
}

impl Default for RoleEligibilityPolicy {
    fn default() -> Self {
        Self::new(["teacher"])
    }
}

impl EligibilityPolicy for RoleEligibilityPolicy {
    fn classify(&self, user: &User) -> Eligibility {
        let Some(role) = user.role.as_deref().map(normalize).filter(|r| !r.is_empty()) else {
            return Eligibility::Ineligible(IneligibleReason::MissingRole);
        };

        if !self.eligible_roles.contains(&role) {
            return Eligibility::Ineligible(IneligibleReason::RoleNotEligible(role));
        }

        if let Some(status) = user.account_status.as_deref().map(normalize) {
            if self.blocked_statuses.contains(&status) {
                return Eligibility::Ineligible(IneligibleReason::BlockedStatus(status));
            }
        }

        Eligibility::Eligible
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn normalize_all<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| normalize(value.as_ref()))
        .filter(|value| !value.is_empty())
        .collect()
}
