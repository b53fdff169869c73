use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    helpers::{conversion_error, now_text, opt_to_i64, opt_to_u64, parse_status},
    models::{Comparison, ComparisonDetails, Properties},
    repositories::{details, report::touch},
    Database,
};

const COMPARISON_COLUMNS: &str = "id, name, status, initial_status, signature, baseline, current, \
     diff, properties, threshold, diff_percentage, diff_count, total_pixels, aa_pixels_ignored, \
     aa_percentage, height_diff, reason, error, has_diff_clusters, has_confirmed_regions, timestamp";

const LISTING_ORDER: &str = "ORDER BY timestamp ASC, updated_at ASC, id ASC";

fn row_to_comparison(row: &Row) -> Result<Comparison, rusqlite::Error> {
    let status: String = row.get("status")?;
    let initial_status: String = row.get("initial_status")?;
    let properties: String = row.get("properties")?;

    Ok(Comparison {
        id: row.get("id")?,
        name: row.get("name")?,
        status: parse_status(&status).map_err(conversion_error)?,
        initial_status: parse_status(&initial_status).map_err(conversion_error)?,
        signature: row.get("signature")?,
        baseline: row.get("baseline")?,
        current: row.get("current")?,
        diff: row.get("diff")?,
        properties: serde_json::from_str::<Properties>(&properties)
            .map_err(|err| conversion_error(err.into()))?,
        threshold: row.get("threshold")?,
        diff_percentage: row.get("diff_percentage")?,
        diff_count: opt_to_u64(row.get("diff_count")?, "diff_count").map_err(conversion_error)?,
        total_pixels: opt_to_u64(row.get("total_pixels")?, "total_pixels")
            .map_err(conversion_error)?,
        aa_pixels_ignored: opt_to_u64(row.get("aa_pixels_ignored")?, "aa_pixels_ignored")
            .map_err(conversion_error)?,
        aa_percentage: row.get("aa_percentage")?,
        height_diff: row.get("height_diff")?,
        reason: row.get("reason")?,
        error: row.get("error")?,
        has_diff_clusters: row.get("has_diff_clusters")?,
        has_confirmed_regions: row.get("has_confirmed_regions")?,
        timestamp: row.get("timestamp")?,
    })
}

/// Insert or update by id. `initial_status` and `created_at` are written only on insert.
pub(crate) fn upsert_row(conn: &Connection, comparison: &Comparison) -> Result<()> {
    let properties =
        serde_json::to_string(&comparison.properties).context("failed to encode properties")?;
    let now = now_text();

    conn.execute(
        "INSERT INTO comparisons (
            id, name, status, initial_status, signature, baseline, current, diff, properties,
            threshold, diff_percentage, diff_count, total_pixels, aa_pixels_ignored,
            aa_percentage, height_diff, reason, error, has_diff_clusters, has_confirmed_regions,
            timestamp, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                  ?18, ?19, ?20, ?21, ?22, ?22)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            status = excluded.status,
            signature = excluded.signature,
            baseline = excluded.baseline,
            current = excluded.current,
            diff = excluded.diff,
            properties = excluded.properties,
            threshold = excluded.threshold,
            diff_percentage = excluded.diff_percentage,
            diff_count = excluded.diff_count,
            total_pixels = excluded.total_pixels,
            aa_pixels_ignored = excluded.aa_pixels_ignored,
            aa_percentage = excluded.aa_percentage,
            height_diff = excluded.height_diff,
            reason = excluded.reason,
            error = excluded.error,
            has_diff_clusters = excluded.has_diff_clusters,
            has_confirmed_regions = excluded.has_confirmed_regions,
            timestamp = excluded.timestamp,
            updated_at = excluded.updated_at",
        params![
            comparison.id,
            comparison.name,
            comparison.status.as_str(),
            comparison.initial_status.as_str(),
            comparison.signature,
            comparison.baseline,
            comparison.current,
            comparison.diff,
            properties,
            comparison.threshold,
            comparison.diff_percentage,
            opt_to_i64(comparison.diff_count)?,
            opt_to_i64(comparison.total_pixels)?,
            opt_to_i64(comparison.aa_pixels_ignored)?,
            comparison.aa_percentage,
            comparison.height_diff,
            comparison.reason,
            comparison.error,
            comparison.has_diff_clusters,
            comparison.has_confirmed_regions,
            comparison.timestamp,
            now,
        ],
    )
    .with_context(|| format!("failed to upsert comparison {}", comparison.id))?;

    Ok(())
}

pub(crate) fn list_comparisons(conn: &Connection) -> Result<Vec<Comparison>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMPARISON_COLUMNS} FROM comparisons {LISTING_ORDER}"
    ))?;
    let rows = stmt.query_map([], row_to_comparison)?;

    let mut comparisons = Vec::new();
    for comparison in rows {
        comparisons.push(comparison.context("failed to decode comparison row")?);
    }
    Ok(comparisons)
}

pub(crate) fn count_comparisons(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM comparisons", [], |row| row.get(0))
        .context("failed to count comparisons")
}

fn find_first_by(conn: &Connection, column: &str, value: &str) -> Result<Option<Comparison>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMPARISON_COLUMNS} FROM comparisons WHERE {column} = ?1 {LISTING_ORDER} LIMIT 1"
    ))?;
    stmt.query_row(params![value], row_to_comparison)
        .optional()
        .with_context(|| format!("failed to look up comparison by {column}"))
}

pub(crate) fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Comparison>> {
    find_first_by(conn, "id", id)
}

impl Database {
    pub async fn list_comparisons(&self) -> Result<Vec<Comparison>> {
        self.execute(|conn| list_comparisons(conn)).await
    }

    /// Insert or update by id, returning the stored row. An existing row keeps its
    /// `initial_status` whatever the incoming value says.
    pub async fn upsert_comparison(&self, comparison: &Comparison) -> Result<Comparison> {
        let record = comparison.clone();
        self.execute_write(move |conn| {
            let tx = conn.transaction()?;
            upsert_row(&tx, &record)?;
            touch(&tx)?;
            let stored = find_by_id(&tx, &record.id)?
                .with_context(|| format!("comparison {} missing after upsert", record.id))?;
            tx.commit().context("failed to commit comparison upsert")?;
            Ok(stored)
        })
        .await
    }

    /// Upsert a comparison together with its details sidecar; `None` clears stale details.
    pub async fn record_comparison(
        &self,
        comparison: &Comparison,
        comparison_details: Option<ComparisonDetails>,
    ) -> Result<Comparison> {
        let record = comparison.clone();
        self.execute_write(move |conn| {
            let tx = conn.transaction()?;
            upsert_row(&tx, &record)?;
            match &comparison_details {
                Some(payload) => details::upsert_row(&tx, &record.id, payload)?,
                None => {
                    details::delete_row(&tx, &record.id)?;
                }
            }
            touch(&tx)?;
            let stored = find_by_id(&tx, &record.id)?
                .with_context(|| format!("comparison {} missing after record", record.id))?;
            tx.commit().context("failed to commit comparison record")?;
            Ok(stored)
        })
        .await
    }

    pub async fn get_comparison(&self, id: &str) -> Result<Option<Comparison>> {
        let id = id.to_string();
        self.execute(move |conn| find_by_id(conn, &id)).await
    }

    pub async fn get_comparison_by_signature(&self, signature: &str) -> Result<Option<Comparison>> {
        let signature = signature.to_string();
        self.execute(move |conn| find_first_by(conn, "signature", &signature))
            .await
    }

    /// Exact id, else signature, else name; first match in listing order.
    pub async fn get_comparison_by_id_or_signature_or_name(
        &self,
        value: &str,
    ) -> Result<Option<Comparison>> {
        let value = value.to_string();
        self.execute(move |conn| {
            for column in ["id", "signature", "name"] {
                if let Some(found) = find_first_by(conn, column, &value)? {
                    return Ok(Some(found));
                }
            }
            Ok(None)
        })
        .await
    }

    /// Remove a comparison and its details atomically. Returns whether the comparison existed.
    pub async fn delete_comparison(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.execute_write(move |conn| {
            let tx = conn.transaction()?;
            details::delete_row(&tx, &id)?;
            let removed = tx
                .execute("DELETE FROM comparisons WHERE id = ?1", params![id])
                .with_context(|| format!("failed to delete comparison {id}"))?;
            touch(&tx)?;
            tx.commit().context("failed to commit comparison delete")?;
            Ok(removed > 0)
        })
        .await
    }
}
