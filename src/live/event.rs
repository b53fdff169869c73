use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use crate::db::{Comparison, ReportState, ReportSummary};

/// One message on a dashboard connection.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Full snapshot, sent on connect and whenever a change cannot be expressed incrementally.
    ReportData(ReportState),
    ComparisonUpdate(Comparison),
    ComparisonRemoved { id: String },
    SummaryUpdate(ReportSummary),
}

impl LiveEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LiveEvent::ReportData(_) => "reportData",
            LiveEvent::ComparisonUpdate(_) => "comparisonUpdate",
            LiveEvent::ComparisonRemoved { .. } => "comparisonRemoved",
            LiveEvent::SummaryUpdate(_) => "summaryUpdate",
        }
    }

    pub fn data(&self) -> Result<String> {
        let data = match self {
            LiveEvent::ReportData(state) => serde_json::to_string(state),
            LiveEvent::ComparisonUpdate(comparison) => serde_json::to_string(comparison),
            LiveEvent::ComparisonRemoved { id } => serde_json::to_string(&json!({ "id": id })),
            LiveEvent::SummaryUpdate(summary) => serde_json::to_string(summary),
        };
        data.with_context(|| format!("failed to serialize {} event", self.event_type()))
    }

    /// Server-sent-events framing: `event: <type>\ndata: <json>\n\n`.
    pub fn to_sse(&self) -> Result<String> {
        Ok(format!("event: {}\ndata: {}\n\n", self.event_type(), self.data()?))
    }

    /// Same event with every image path rewritten for the browser.
    pub fn with_image_urls(self, urls: &ImageUrls) -> Self {
        match self {
            LiveEvent::ReportData(mut state) => {
                for comparison in &mut state.comparisons {
                    urls.rewrite_comparison(comparison);
                }
                LiveEvent::ReportData(state)
            }
            LiveEvent::ComparisonUpdate(mut comparison) => {
                urls.rewrite_comparison(&mut comparison);
                LiveEvent::ComparisonUpdate(comparison)
            }
            other => other,
        }
    }
}

/// Maps files under the state directory onto the URL prefix the image server mounts them at.
#[derive(Debug, Clone)]
pub struct ImageUrls {
    state_dir: String,
    prefix: String,
}

impl ImageUrls {
    pub fn new(state_dir: &Path, prefix: impl Into<String>) -> Self {
        let state_dir = state_dir
            .to_string_lossy()
            .trim_end_matches(['/', '\\'])
            .to_string();
        let prefix = prefix.into().trim_end_matches('/').to_string();
        Self { state_dir, prefix }
    }

    /// Paths outside the state directory pass through untouched.
    pub fn rewrite(&self, path: &str) -> String {
        match path.strip_prefix(self.state_dir.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
                format!("{}{}", self.prefix, rest.replace('\\', "/"))
            }
            _ => path.to_string(),
        }
    }

    fn rewrite_comparison(&self, comparison: &mut Comparison) {
        for image in [
            &mut comparison.baseline,
            &mut comparison.current,
            &mut comparison.diff,
        ] {
            if let Some(path) = image.as_mut() {
                *path = self.rewrite(path);
            }
        }
    }
}
