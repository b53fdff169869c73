//! One-time import of the flat-file layout that predates the SQLite store.
//!
//! Every import is guarded by a marker in `legacy_imports`. The marker is written on the first
//! attempt whatever happened, so a store never scans for legacy files again. Unreadable or
//! unparsable files count as "nothing to import" and never block the store from opening.

use std::{
    collections::HashMap,
    fs, io,
    path::Path,
};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::Value;

use crate::db::{
    helpers::now_text,
    metadata_codec::codec,
    models::{Comparison, ComparisonDetails, ComparisonStatus, DiffDiagnostics, MetadataKey, Properties},
    repositories::{comparisons, metadata, report},
};

pub const LEGACY_REPORT_FILE: &str = "report-data.json";
pub const LEGACY_DETAILS_FILE: &str = "comparison-details.json";
const REPORT_MARKER: &str = "report";

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug)]
enum Outcome {
    Imported(usize),
    Missing,
    /// Target already held data, so the legacy file was not consulted.
    Skipped,
    Unparsable(String),
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Imported(_) => "imported",
            Outcome::Missing => "missing",
            Outcome::Skipped => "skipped",
            Outcome::Unparsable(_) => "unparsable",
        }
    }
}

pub fn run_legacy_imports(conn: &mut Connection, state_dir: &Path) -> Result<()> {
    import_report(conn, state_dir)?;
    for key in MetadataKey::ALL {
        import_bundle(conn, state_dir, key)?;
    }
    Ok(())
}

fn marker_exists(conn: &Connection, marker: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT marker FROM legacy_imports WHERE marker = ?1",
            params![marker],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to read legacy marker {marker}"))?;
    Ok(found.is_some())
}

fn write_marker(conn: &Connection, marker: &str, outcome: &Outcome) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO legacy_imports (marker, outcome, completed_at) VALUES (?1, ?2, ?3)",
        params![marker, outcome.as_str(), now_text()],
    )
    .with_context(|| format!("failed to write legacy marker {marker}"))?;
    Ok(())
}

fn log_outcome(marker: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Imported(count) => log_info!("Legacy import {marker}: imported {count} record(s)"),
        Outcome::Unparsable(reason) => {
            log_debug!("Legacy import {marker} skipped, file unusable: {reason}")
        }
        Outcome::Missing | Outcome::Skipped => {
            log_debug!("Legacy import {marker}: {}", outcome.as_str())
        }
    }
}

/// `Ok(None)` when the file does not exist.
fn read_json(path: &Path) -> Result<Option<Value>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(anyhow!(err).context(format!("failed to read {}", path.display()))),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn import_report(conn: &mut Connection, state_dir: &Path) -> Result<()> {
    if marker_exists(conn, REPORT_MARKER)? {
        return Ok(());
    }

    let mut tx = conn.transaction().context("failed to open legacy import transaction")?;

    let outcome = if comparisons::count_comparisons(&tx)? > 0 {
        Outcome::Skipped
    } else {
        match load_legacy_report(state_dir) {
            Ok(None) => Outcome::Missing,
            Err(err) => Outcome::Unparsable(format!("{err:#}")),
            Ok(Some((records, details_by_id))) => {
                // Rows that parse but cannot be stored void the whole import, not the open.
                let savepoint = tx.savepoint().context("failed to open legacy import savepoint")?;
                match report::replace_all(&savepoint, &records, &details_by_id) {
                    Ok(()) => {
                        savepoint.commit().context("failed to release legacy import savepoint")?;
                        Outcome::Imported(records.len())
                    }
                    Err(err) => Outcome::Unparsable(format!("{err:#}")),
                }
            }
        }
    };

    write_marker(&tx, REPORT_MARKER, &outcome)?;
    tx.commit().context("failed to commit legacy report import")?;
    log_outcome(REPORT_MARKER, &outcome);
    Ok(())
}

fn import_bundle(conn: &mut Connection, state_dir: &Path, key: MetadataKey) -> Result<()> {
    let codec = codec(key);
    if marker_exists(conn, codec.legacy_marker)? {
        return Ok(());
    }

    let tx = conn.transaction().context("failed to open legacy metadata transaction")?;

    let outcome = if metadata::read_bundle(&tx, key).ok().flatten().is_some() {
        Outcome::Skipped
    } else {
        let decoded = read_json(&state_dir.join(codec.legacy_file))
            .and_then(|value| value.map(codec.decode).transpose());
        match decoded {
            Ok(None) => Outcome::Missing,
            Err(err) => Outcome::Unparsable(format!("{err:#}")),
            Ok(Some(bundle)) => match metadata::write_bundle(&tx, key, &bundle) {
                Ok(()) => Outcome::Imported(1),
                Err(err) => Outcome::Unparsable(format!("{err:#}")),
            },
        }
    };

    write_marker(&tx, codec.legacy_marker, &outcome)?;
    tx.commit().context("failed to commit legacy metadata import")?;
    log_outcome(codec.legacy_marker, &outcome);
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyReport {
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    comparisons: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyComparison {
    #[serde(default)]
    id: Option<String>,
    name: String,
    status: ComparisonStatus,
    #[serde(default)]
    initial_status: Option<ComparisonStatus>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    baseline: Option<String>,
    #[serde(default)]
    current: Option<String>,
    #[serde(default)]
    diff: Option<String>,
    #[serde(default)]
    properties: Value,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    diff_percentage: Option<f64>,
    #[serde(default)]
    diff_count: Option<u64>,
    #[serde(default)]
    total_pixels: Option<u64>,
    #[serde(default)]
    aa_pixels_ignored: Option<u64>,
    #[serde(default)]
    aa_percentage: Option<f64>,
    #[serde(default)]
    height_diff: Option<i64>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(flatten)]
    inline: DiffDiagnostics,
}

type LegacySnapshot = (Vec<Comparison>, HashMap<String, ComparisonDetails>);

fn load_legacy_report(state_dir: &Path) -> Result<Option<LegacySnapshot>> {
    let Some(raw_report) = read_json(&state_dir.join(LEGACY_REPORT_FILE))? else {
        return Ok(None);
    };
    let legacy: LegacyReport =
        serde_json::from_value(raw_report).context("legacy report has an unexpected shape")?;

    // The sidecar is optional; a broken sidecar only loses the heavy payloads.
    let mut sidecar: HashMap<String, Value> = match read_json(&state_dir.join(LEGACY_DETAILS_FILE)) {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
        Ok(None) => HashMap::new(),
        Err(err) => {
            log_debug!("Ignoring legacy details sidecar: {err:#}");
            HashMap::new()
        }
    };

    let fallback_timestamp = legacy.timestamp.unwrap_or(0);
    let mut records = Vec::with_capacity(legacy.comparisons.len());
    let mut details_by_id = HashMap::new();

    for (index, raw) in legacy.comparisons.into_iter().enumerate() {
        let entry: LegacyComparison = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(err) => {
                log_debug!("Skipping legacy comparison #{index}: {err}");
                continue;
            }
        };
        let properties = match Properties::normalize(&entry.properties) {
            Ok(properties) => properties,
            Err(err) => {
                log_debug!("Skipping legacy comparison '{}': {err}", entry.name);
                continue;
            }
        };

        let id = entry
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let diagnostics = match sidecar.remove(&id) {
            Some(value) => serde_json::from_value::<DiffDiagnostics>(value).unwrap_or_default(),
            None => entry.inline.clone(),
        };
        let details = diagnostics.into_details();

        let signature = entry
            .signature
            .clone()
            .unwrap_or_else(|| properties.signature(&entry.name, &[]));

        let record = Comparison {
            id: id.clone(),
            status: entry.status,
            initial_status: entry.initial_status.unwrap_or(entry.status),
            signature,
            baseline: entry.baseline,
            current: entry.current,
            diff: entry.diff,
            properties,
            threshold: entry.threshold.unwrap_or(0.0),
            diff_percentage: entry.diff_percentage,
            diff_count: entry.diff_count,
            total_pixels: entry.total_pixels,
            aa_pixels_ignored: entry.aa_pixels_ignored,
            aa_percentage: entry.aa_percentage,
            height_diff: entry.height_diff,
            reason: entry.reason,
            error: entry.error,
            has_diff_clusters: details.as_ref().is_some_and(ComparisonDetails::has_diff_clusters),
            has_confirmed_regions: details
                .as_ref()
                .is_some_and(ComparisonDetails::has_confirmed_regions),
            timestamp: entry.timestamp.unwrap_or(fallback_timestamp + index as i64),
            name: entry.name,
        };

        if let Some(details) = details {
            details_by_id.insert(id, details);
        }
        records.push(record);
    }

    Ok(Some((records, details_by_id)))
}
