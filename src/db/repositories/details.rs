use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{helpers::now_text, models::ComparisonDetails, Database};

pub(crate) fn upsert_row(conn: &Connection, id: &str, details: &ComparisonDetails) -> Result<()> {
    let payload = serde_json::to_string(details).context("failed to encode comparison details")?;
    conn.execute(
        "INSERT INTO comparison_details (id, payload, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
        params![id, payload, now_text()],
    )
    .with_context(|| format!("failed to store details for {id}"))?;
    Ok(())
}

pub(crate) fn delete_row(conn: &Connection, id: &str) -> Result<bool> {
    let removed = conn
        .execute("DELETE FROM comparison_details WHERE id = ?1", params![id])
        .with_context(|| format!("failed to delete details for {id}"))?;
    Ok(removed > 0)
}

pub(crate) fn find_row(conn: &Connection, id: &str) -> Result<Option<ComparisonDetails>> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload FROM comparison_details WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to load details for {id}"))?;

    payload
        .map(|raw| {
            serde_json::from_str(&raw).with_context(|| format!("corrupt details payload for {id}"))
        })
        .transpose()
}

impl Database {
    pub async fn upsert_comparison_details(
        &self,
        id: &str,
        details: &ComparisonDetails,
    ) -> Result<()> {
        let id = id.to_string();
        let details = details.clone();
        self.execute_write(move |conn| upsert_row(conn, &id, &details))
            .await
    }

    pub async fn get_comparison_details(&self, id: &str) -> Result<Option<ComparisonDetails>> {
        let id = id.to_string();
        self.execute(move |conn| find_row(conn, &id)).await
    }

    pub async fn remove_comparison_details(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.execute_removal(move |conn| delete_row(conn, &id)).await
    }
}
