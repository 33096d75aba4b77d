use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, UserId};
use super::eligibility::IneligibleReason;

/// What happened to one user during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserOutcome {
    Created(ApplicationId),
    AlreadyExisting,
    Ineligible(IneligibleReason),
    Failed(String),
}

/// Aggregated outcome counts for one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationTally {
    pub created: usize,
    pub already_existing: usize,
    pub ineligible: usize,
    pub failed: usize,
    pub failed_user_ids: Vec<UserId>,
    /// Set when the pass stopped early; counts cover only the users visited.
    #[serde(default)]
    pub cancelled: bool,
}

impl ReconciliationTally {
    pub fn record(&mut self, user_id: UserId, outcome: &UserOutcome) {
        match outcome {
            UserOutcome::Created(_) => self.created += 1,
            UserOutcome::AlreadyExisting => self.already_existing += 1,
            UserOutcome::Ineligible(_) => self.ineligible += 1,
            UserOutcome::Failed(_) => {
                self.failed += 1;
                self.failed_user_ids.push(user_id);
            }
        }
    }

    /// Users visited so far.
    pub fn total(&self) -> usize {
        self.created + self.already_existing + self.ineligible + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "created {}, already existing {}, ineligible {}, failed {}",
            self.created, self.already_existing, self.ineligible, self.failed
        );
        if !self.failed_user_ids.is_empty() {
            let ids: Vec<String> = self.failed_user_ids.iter().map(UserId::to_string).collect();
            line.push_str(&format!(" (failed users: {})", ids.join(", ")));
        }
        if self.cancelled {
            line.push_str(" [cancelled before completion]");
        }
        line
    }
}

impl<'a> FromIterator<(UserId, &'a UserOutcome)> for ReconciliationTally {
    fn from_iter<T: IntoIterator<Item = (UserId, &'a UserOutcome)>>(iter: T) -> Self {
        let mut tally = Self::default();
        for (user_id, outcome) in iter {
            tally.record(user_id, outcome);
        }
        tally
    }
}
