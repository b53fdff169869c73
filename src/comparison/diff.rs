use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::db::{DiffDiagnostics, Properties};

/// Everything a differ needs for one comparison.
#[derive(Debug, Clone, Copy)]
pub struct DiffRequest<'a> {
    pub name: &'a str,
    pub image: &'a [u8],
    pub properties: &'a Properties,
    pub baseline_path: &'a Path,
    pub current_path: &'a Path,
    /// Where a diff image should be written, if the differ produces one.
    pub diff_path: &'a Path,
    /// Percentage of differing pixels still considered a match.
    pub threshold: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffOutcome {
    /// Within threshold.
    pub matched: bool,
    /// Set when the differ wrote an image to `DiffRequest::diff_path`.
    pub diff_written: bool,
    pub diff_percentage: Option<f64>,
    pub diff_count: Option<u64>,
    pub total_pixels: Option<u64>,
    pub aa_pixels_ignored: Option<u64>,
    pub aa_percentage: Option<f64>,
    pub height_diff: Option<i64>,
    pub reason: Option<String>,
    pub diagnostics: DiffDiagnostics,
}

/// Opaque pixel comparison. Errors are recorded on the comparison, never propagated.
#[async_trait]
pub trait DiffCollaborator: Send + Sync {
    async fn compare(&self, request: DiffRequest<'_>) -> Result<DiffOutcome>;
}

/// Byte-for-byte equality with the baseline file; stands in when no pixel differ is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactBytesDiff;

#[async_trait]
impl DiffCollaborator for ExactBytesDiff {
    async fn compare(&self, request: DiffRequest<'_>) -> Result<DiffOutcome> {
        let baseline = tokio::fs::read(request.baseline_path)
            .await
            .with_context(|| format!("failed to read baseline {}", request.baseline_path.display()))?;

        let matched = baseline == request.image;
        Ok(DiffOutcome {
            matched,
            diff_percentage: Some(if matched { 0.0 } else { 100.0 }),
            reason: (!matched).then(|| "content-mismatch".to_string()),
            ..DiffOutcome::default()
        })
    }
}
