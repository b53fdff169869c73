use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    helpers::{format_datetime, now_text},
    metadata_codec::codec,
    models::{MetadataBundle, MetadataKey},
    Database,
};

pub(crate) fn write_bundle(conn: &Connection, key: MetadataKey, bundle: &MetadataBundle) -> Result<()> {
    let body = (codec(key).encode)(bundle).with_context(|| format!("invalid {key} bundle"))?;
    conn.execute(
        "INSERT INTO metadata_bundles (key, version, downloaded_at, body, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(key) DO UPDATE SET
            version = excluded.version,
            downloaded_at = excluded.downloaded_at,
            body = excluded.body,
            updated_at = excluded.updated_at",
        params![
            key.as_str(),
            bundle.version,
            bundle.downloaded_at.as_ref().map(format_datetime),
            body.to_string(),
            now_text(),
        ],
    )
    .with_context(|| format!("failed to store {key} metadata"))?;
    Ok(())
}

pub(crate) fn read_bundle(conn: &Connection, key: MetadataKey) -> Result<Option<MetadataBundle>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM metadata_bundles WHERE key = ?1",
            params![key.as_str()],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to load {key} metadata"))?;

    body.map(|raw| {
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt {key} metadata body"))?;
        (codec(key).decode)(value)
    })
    .transpose()
}

impl Database {
    pub async fn get_metadata(&self, key: MetadataKey) -> Result<Option<MetadataBundle>> {
        self.execute(move |conn| read_bundle(conn, key)).await
    }

    /// Overwrites the bundle wholesale.
    pub async fn set_metadata(&self, key: MetadataKey, bundle: &MetadataBundle) -> Result<()> {
        let bundle = bundle.clone();
        self.execute_write(move |conn| write_bundle(conn, key, &bundle))
            .await
    }

    pub async fn remove_metadata(&self, key: MetadataKey) -> Result<bool> {
        self.execute_removal(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM metadata_bundles WHERE key = ?1",
                    params![key.as_str()],
                )
                .with_context(|| format!("failed to remove {key} metadata"))?;
            Ok(removed > 0)
        })
        .await
    }
}
