use std::collections::HashMap;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    helpers::{now_millis, now_text},
    models::{Comparison, ComparisonDetails, ReportState},
    repositories::{comparisons, details},
    Database,
};

const INITIALIZED_KEY: &str = "initialized";
const LAST_WRITE_KEY: &str = "last_write_ms";

fn set_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO store_state (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now_text()],
    )
    .with_context(|| format!("failed to write store_state {key}"))?;
    Ok(())
}

fn get_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM store_state WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("failed to read store_state {key}"))
}

/// Record that a write happened; from now on the store reports as initialized.
pub(crate) fn touch(conn: &Connection) -> Result<()> {
    set_state(conn, INITIALIZED_KEY, "true")?;
    set_state(conn, LAST_WRITE_KEY, &now_millis().to_string())
}

pub(crate) fn read_report(conn: &Connection) -> Result<Option<ReportState>> {
    let initialized = get_state(conn, INITIALIZED_KEY)?.is_some();
    let comparisons = comparisons::list_comparisons(conn)?;
    if !initialized && comparisons.is_empty() {
        return Ok(None);
    }

    let timestamp = get_state(conn, LAST_WRITE_KEY)?
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or_else(now_millis);
    Ok(Some(ReportState::new(timestamp, comparisons)))
}

fn clear_all(tx: &Connection) -> Result<()> {
    tx.execute("DELETE FROM comparison_details", [])
        .context("failed to clear comparison details")?;
    tx.execute("DELETE FROM comparisons", [])
        .context("failed to clear comparisons")?;
    Ok(())
}

/// Full replace inside the caller's transaction or savepoint. Details whose id has no comparison
/// are dropped.
pub(crate) fn replace_all(
    tx: &Connection,
    records: &[Comparison],
    details_by_id: &HashMap<String, ComparisonDetails>,
) -> Result<()> {
    clear_all(tx)?;
    for record in records {
        comparisons::upsert_row(tx, record)?;
        if let Some(payload) = details_by_id.get(&record.id) {
            details::upsert_row(tx, &record.id, payload)?;
        }
    }
    let orphans = details_by_id
        .keys()
        .filter(|id| !records.iter().any(|record| &record.id == *id))
        .count();
    if orphans > 0 {
        log::debug!("Dropped {orphans} detail payloads with no matching comparison");
    }
    touch(tx)
}

impl Database {
    /// Current report, or `None` if nothing has ever been written.
    pub async fn read_report_data(&self) -> Result<Option<ReportState>> {
        self.execute(|conn| {
            // One read transaction so the listing and the store state agree.
            let tx = conn.transaction()?;
            let report = read_report(&tx)?;
            tx.commit()?;
            Ok(report)
        })
        .await
    }

    pub async fn replace_report_data(
        &self,
        records: Vec<Comparison>,
        details_by_id: HashMap<String, ComparisonDetails>,
    ) -> Result<()> {
        self.execute_write(move |conn| {
            let tx = conn.transaction()?;
            replace_all(&tx, &records, &details_by_id)?;
            tx.commit().context("failed to commit report replace")?;
            Ok(())
        })
        .await
    }

    pub async fn reset_report_data(&self) -> Result<()> {
        self.execute_write(|conn| {
            let tx = conn.transaction()?;
            clear_all(&tx)?;
            touch(&tx)?;
            tx.commit().context("failed to commit report reset")?;
            Ok(())
        })
        .await
    }
}
