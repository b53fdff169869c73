use std::fmt;

use serde::{Deserialize, Serialize};

use super::properties::Properties;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonStatus {
    New,
    Passed,
    Failed,
    BaselineUpdated,
    Accepted,
    Rejected,
    Error,
}

impl ComparisonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonStatus::New => "new",
            ComparisonStatus::Passed => "passed",
            ComparisonStatus::Failed => "failed",
            ComparisonStatus::BaselineUpdated => "baseline-updated",
            ComparisonStatus::Accepted => "accepted",
            ComparisonStatus::Rejected => "rejected",
            ComparisonStatus::Error => "error",
        }
    }
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluated screenshot check. Heavy diagnostics live in
/// [`ComparisonDetails`](super::ComparisonDetails); only presence hints stay here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub id: String,
    pub name: String,
    pub status: ComparisonStatus,
    pub initial_status: ComparisonStatus,
    pub signature: String,
    #[serde(default)]
    pub baseline: Option<String>,
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub diff_percentage: Option<f64>,
    #[serde(default)]
    pub diff_count: Option<u64>,
    #[serde(default)]
    pub total_pixels: Option<u64>,
    #[serde(default)]
    pub aa_pixels_ignored: Option<u64>,
    #[serde(default)]
    pub aa_percentage: Option<f64>,
    #[serde(default)]
    pub height_diff: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub has_diff_clusters: bool,
    #[serde(default)]
    pub has_confirmed_regions: bool,
    /// Capture time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl Comparison {
    /// A bare record with no metrics; the engine and tests fill in the rest.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        status: ComparisonStatus,
        signature: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            initial_status: status,
            signature: signature.into(),
            baseline: None,
            current: None,
            diff: None,
            properties: Properties::default(),
            threshold: 0.0,
            diff_percentage: None,
            diff_count: None,
            total_pixels: None,
            aa_pixels_ignored: None,
            aa_percentage: None,
            height_diff: None,
            reason: None,
            error: None,
            has_diff_clusters: false,
            has_confirmed_regions: false,
            timestamp,
        }
    }

    pub fn with_status(&self, status: ComparisonStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}
