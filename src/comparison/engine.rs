use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    db::{Comparison, ComparisonDetails, ComparisonStatus, Database, Properties},
    error::{EngineError, EngineResult},
    settings::Settings,
};

use super::{
    diff::{DiffCollaborator, DiffRequest},
    layout::{ImageLayout, ImagePaths},
    state::ReportedStatus,
    validate::{validate_name, validate_threshold},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const EVENT_CAPACITY: usize = 256;

/// Emitted once per handled screenshot and per review decision.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotEvent {
    pub id: String,
    pub name: String,
    pub signature: String,
    pub status: ReportedStatus,
    pub diff_percentage: Option<f64>,
    pub properties: Properties,
    pub timestamp: i64,
}

impl From<&Comparison> for ScreenshotEvent {
    fn from(comparison: &Comparison) -> Self {
        Self {
            id: comparison.id.clone(),
            name: comparison.name.clone(),
            signature: comparison.signature.clone(),
            status: comparison.status.reported(),
            diff_percentage: comparison.diff_percentage,
            properties: comparison.properties.clone(),
            timestamp: comparison.timestamp,
        }
    }
}

/// A captured screenshot as it arrives from a test run, properties still unnormalized.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub name: String,
    pub image: Vec<u8>,
    pub properties: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions {
    /// Overrides the configured default threshold.
    pub threshold: Option<f64>,
    /// Store the capture as the new baseline without diffing.
    pub set_baseline: bool,
}

#[derive(Clone)]
pub struct ComparisonEngine {
    db: Database,
    differ: Arc<dyn DiffCollaborator>,
    layout: ImageLayout,
    default_threshold: f64,
    signature_properties: Arc<Vec<String>>,
    events: broadcast::Sender<ScreenshotEvent>,
}

impl ComparisonEngine {
    pub fn new(db: Database, differ: Arc<dyn DiffCollaborator>, settings: &Settings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            layout: ImageLayout::new(db.state_dir()),
            db,
            differ,
            default_threshold: settings.default_threshold,
            signature_properties: Arc::new(settings.signature_properties.clone()),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ScreenshotEvent> {
        self.events.subscribe()
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    /// Compare one capture and persist the outcome. Differ failures become `status=error`.
    pub async fn handle_screenshot(
        &self,
        screenshot: Screenshot,
        options: CompareOptions,
    ) -> EngineResult<Comparison> {
        validate_name(&screenshot.name)?;
        let properties = Properties::normalize(&screenshot.properties)?;
        let threshold = validate_threshold(options.threshold.unwrap_or(self.default_threshold))?;

        let signature = properties.signature(&screenshot.name, &self.signature_properties);
        let paths = self.layout.paths_for(&signature);
        self.ensure_dirs().await?;
        tokio::fs::write(&paths.current, &screenshot.image)
            .await
            .with_context(|| format!("failed to write {}", paths.current.display()))?;

        let id = self
            .db
            .get_comparison_by_signature(&signature)
            .await?
            .map(|existing| existing.id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut record = Comparison::new(
            id,
            screenshot.name.as_str(),
            ComparisonStatus::Passed,
            signature.as_str(),
            Utc::now().timestamp_millis(),
        );
        record.properties = properties;
        record.threshold = threshold;
        record.baseline = Some(path_text(&paths.baseline));
        record.current = Some(path_text(&paths.current));

        let details = self
            .evaluate(&mut record, &screenshot.image, &paths, options)
            .await?;
        record.initial_status = record.status;
        if let Some(details) = &details {
            record.has_diff_clusters = details.has_diff_clusters();
            record.has_confirmed_regions = details.has_confirmed_regions();
        }

        let stored = self.db.record_comparison(&record, details).await?;
        log_info!(
            "Comparison '{}' ({}) -> {}",
            stored.name,
            stored.signature,
            stored.status
        );
        self.emit(&stored);
        Ok(stored)
    }

    /// Fill status and metrics on `record`; returns the heavy sidecar, if any.
    async fn evaluate(
        &self,
        record: &mut Comparison,
        image: &[u8],
        paths: &ImagePaths,
        options: CompareOptions,
    ) -> EngineResult<Option<ComparisonDetails>> {
        let baseline_exists = tokio::fs::try_exists(&paths.baseline)
            .await
            .unwrap_or(false);

        if options.set_baseline || !baseline_exists {
            tokio::fs::write(&paths.baseline, image)
                .await
                .with_context(|| format!("failed to write {}", paths.baseline.display()))?;
            remove_if_present(&paths.diff).await?;
            record.status = if options.set_baseline {
                ComparisonStatus::BaselineUpdated
            } else {
                ComparisonStatus::New
            };
            return Ok(None);
        }

        remove_if_present(&paths.diff).await?;
        let request = DiffRequest {
            name: &record.name,
            image,
            properties: &record.properties,
            baseline_path: &paths.baseline,
            current_path: &paths.current,
            diff_path: &paths.diff,
            threshold: record.threshold,
        };

        let result = self.differ.compare(request).await;
        match result {
            Ok(outcome) => {
                record.status = if outcome.matched {
                    ComparisonStatus::Passed
                } else {
                    ComparisonStatus::Failed
                };
                if outcome.diff_written {
                    record.diff = Some(path_text(&paths.diff));
                }
                record.diff_percentage = outcome.diff_percentage;
                record.diff_count = outcome.diff_count;
                record.total_pixels = outcome.total_pixels;
                record.aa_pixels_ignored = outcome.aa_pixels_ignored;
                record.aa_percentage = outcome.aa_percentage;
                record.height_diff = outcome.height_diff;
                record.reason = outcome.reason;
                Ok(outcome.diagnostics.into_details())
            }
            Err(err) => {
                log_warn!("Differ failed for '{}': {err:#}", record.name);
                record.status = ComparisonStatus::Error;
                record.error = Some(format!("{err:#}"));
                Ok(None)
            }
        }
    }

    /// Promote the current image to baseline, whatever the previous outcome.
    pub async fn accept(&self, target: &str) -> EngineResult<Comparison> {
        let comparison = self.resolve(target).await?;
        self.accept_comparison(comparison).await
    }

    /// Keep the baseline and mark the capture as reviewed-and-wrong. Metrics stay for audit.
    pub async fn reject(&self, target: &str) -> EngineResult<Comparison> {
        let comparison = self.resolve(target).await?;
        comparison
            .status
            .ensure_transition(ComparisonStatus::Rejected)?;

        let stored = self
            .db
            .upsert_comparison(&comparison.with_status(ComparisonStatus::Rejected))
            .await?;
        self.emit(&stored);
        Ok(stored)
    }

    /// Accept every comparison that is failed or new. Returns how many were accepted.
    pub async fn accept_all(&self) -> EngineResult<usize> {
        let pending: Vec<Comparison> = self
            .db
            .list_comparisons()
            .await?
            .into_iter()
            .filter(|c| matches!(c.status, ComparisonStatus::Failed | ComparisonStatus::New))
            .collect();

        let count = pending.len();
        for comparison in pending {
            self.accept_comparison(comparison).await?;
        }
        Ok(count)
    }

    /// Remove one comparison, its details, and its current/diff images.
    pub async fn delete(&self, target: &str) -> EngineResult<Comparison> {
        let comparison = self.resolve(target).await?;
        if !self.db.delete_comparison(&comparison.id).await? {
            return Err(EngineError::NotFound(target.to_string()));
        }
        for image in [&comparison.current, &comparison.diff].into_iter().flatten() {
            remove_if_present(Path::new(image)).await?;
        }
        Ok(comparison)
    }

    /// Clear the store and every image directory.
    pub async fn reset(&self) -> EngineResult<()> {
        self.db.reset_report_data().await?;
        for dir in self.layout.dirs() {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("failed to remove {}", dir.display()))
                        .into())
                }
            }
        }
        log_info!("Reset comparisons and images under {}", self.layout.state_dir().display());
        Ok(())
    }

    async fn accept_comparison(&self, comparison: Comparison) -> EngineResult<Comparison> {
        comparison
            .status
            .ensure_transition(ComparisonStatus::Accepted)?;

        let baseline = comparison
            .baseline
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.layout.paths_for(&comparison.signature).baseline);

        let current = comparison
            .current
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.layout.paths_for(&comparison.signature).current);
        if !tokio::fs::try_exists(&current).await.unwrap_or(false) {
            log_warn!(
                "Cannot accept '{}': no current image at {}",
                comparison.name,
                current.display()
            );
            return Err(EngineError::MissingImage {
                id: comparison.id,
                path: path_text(&current),
            });
        }

        if let Some(parent) = baseline.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&current, &baseline)
            .await
            .with_context(|| format!("failed to promote {} to baseline", current.display()))?;

        let mut accepted = comparison.with_status(ComparisonStatus::Accepted);
        accepted.baseline = Some(path_text(&baseline));
        let stored = self.db.upsert_comparison(&accepted).await?;
        self.emit(&stored);
        Ok(stored)
    }

    /// Signature first, then id, then name.
    async fn resolve(&self, target: &str) -> EngineResult<Comparison> {
        if let Some(found) = self.db.get_comparison_by_signature(target).await? {
            return Ok(found);
        }
        self.db
            .get_comparison_by_id_or_signature_or_name(target)
            .await?
            .ok_or_else(|| EngineError::NotFound(target.to_string()))
    }

    async fn ensure_dirs(&self) -> EngineResult<()> {
        for dir in self.layout.dirs() {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    fn emit(&self, comparison: &Comparison) {
        // No receivers is fine.
        let _ = self.events.send(ScreenshotEvent::from(comparison));
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn remove_if_present(path: &Path) -> EngineResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(anyhow::Error::new(err)
            .context(format!("failed to remove {}", path.display()))
            .into()),
    }
}
