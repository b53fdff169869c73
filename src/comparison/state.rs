use serde::{Deserialize, Serialize};

use crate::{db::ComparisonStatus, error::ValidationError};

/// Status vocabulary exposed to dashboards and telemetry, decoupled from the stored enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReportedStatus {
    New,
    Passed,
    Diff,
    BaselineUpdated,
    Accepted,
    Rejected,
    Error,
}

impl ComparisonStatus {
    pub fn reported(&self) -> ReportedStatus {
        match self {
            ComparisonStatus::New => ReportedStatus::New,
            ComparisonStatus::Passed => ReportedStatus::Passed,
            ComparisonStatus::Failed => ReportedStatus::Diff,
            ComparisonStatus::BaselineUpdated => ReportedStatus::BaselineUpdated,
            ComparisonStatus::Accepted => ReportedStatus::Accepted,
            ComparisonStatus::Rejected => ReportedStatus::Rejected,
            ComparisonStatus::Error => ReportedStatus::Error,
        }
    }

    /// Review transitions only; fresh comparison outcomes overwrite any status.
    pub fn can_transition_to(&self, next: ComparisonStatus) -> bool {
        use ComparisonStatus::*;
        match (self, next) {
            (Error, _) => false,
            (_, Accepted) => true,
            (Failed | New | Accepted | Rejected, Rejected) => true,
            _ => false,
        }
    }

    pub fn ensure_transition(&self, next: ComparisonStatus) -> Result<(), ValidationError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ValidationError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }
}
