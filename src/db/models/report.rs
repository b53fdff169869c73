use serde::{Deserialize, Serialize};

use super::comparison::{Comparison, ComparisonStatus};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub rejected: usize,
    pub errors: usize,
}

impl ReportSummary {
    /// New, baseline-updated and accepted comparisons count as passed.
    pub fn from_comparisons(comparisons: &[Comparison]) -> Self {
        let mut summary = Self {
            total: comparisons.len(),
            ..Self::default()
        };
        for comparison in comparisons {
            match comparison.status {
                ComparisonStatus::New
                | ComparisonStatus::Passed
                | ComparisonStatus::BaselineUpdated
                | ComparisonStatus::Accepted => summary.passed += 1,
                ComparisonStatus::Failed => summary.failed += 1,
                ComparisonStatus::Rejected => summary.rejected += 1,
                ComparisonStatus::Error => summary.errors += 1,
            }
        }
        summary
    }
}

/// Derived view of the store; never persisted as such.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportState {
    /// Time of the last committed write, epoch milliseconds.
    pub timestamp: i64,
    pub comparisons: Vec<Comparison>,
    pub summary: ReportSummary,
}

impl ReportState {
    pub fn new(timestamp: i64, comparisons: Vec<Comparison>) -> Self {
        let summary = ReportSummary::from_comparisons(&comparisons);
        Self {
            timestamp,
            comparisons,
            summary,
        }
    }
}
