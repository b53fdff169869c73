use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::db::helpers::now_text;

pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    sql: &'static str,
}

/// Append-only. Versions are contiguous starting at 1.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "comparisons_and_details",
        sql: include_str!("schemas/schema_v1.sql"),
    },
    Migration {
        version: 2,
        name: "metadata_bundles_and_legacy_markers",
        sql: include_str!("schemas/schema_v2.sql"),
    },
];

const LEDGER_DDL: &str = "CREATE TABLE schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Apply every migration missing from the ledger, in order, one transaction each.
/// Returns the versions applied by this call.
pub fn run_migrations(conn: &mut Connection) -> Result<Vec<u32>> {
    let current = if ledger_exists(conn)? {
        schema_version(conn)?
    } else {
        0
    };

    let latest = latest_version();
    if current > latest {
        bail!(
            "database version ({}) is newer than supported schema ({})",
            current,
            latest
        );
    }

    let mut applied = Vec::new();
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn
            .transaction()
            .context("failed to open migration transaction")?;

        apply_migration(&tx, migration).with_context(|| {
            format!(
                "migration {} ({}) failed",
                migration.version, migration.name
            )
        })?;

        tx.commit().with_context(|| {
            format!(
                "failed to commit migration {} ({})",
                migration.version, migration.name
            )
        })?;

        log::info!(
            "Applied schema migration {} ({})",
            migration.version,
            migration.name
        );
        applied.push(migration.version);
    }

    Ok(applied)
}

fn apply_migration(tx: &Transaction<'_>, migration: &Migration) -> Result<()> {
    if !ledger_exists(tx)? {
        tx.execute_batch(LEDGER_DDL)
            .context("failed to create schema_migrations ledger")?;
    }

    tx.execute_batch(migration.sql)
        .context("failed to execute migration SQL")?;

    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        params![migration.version, migration.name, now_text()],
    )
    .context("failed to record migration in ledger")?;

    Ok(())
}

fn ledger_exists(conn: &Connection) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |row| row.get(0),
        )
        .optional()
        .context("failed to look up schema_migrations")?;
    Ok(found.is_some())
}

/// Highest applied migration, or 0 for a fresh file.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    if !ledger_exists(conn)? {
        return Ok(0);
    }
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .context("failed to read schema_migrations")?;
    Ok(version.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_contiguous() {
        for (index, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, index + 1);
        }
    }

    #[test]
    fn fresh_connection_applies_everything_once() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        assert_eq!(run_migrations(&mut conn)?, vec![1, 2]);
        assert_eq!(schema_version(&conn)?, 2);

        assert!(run_migrations(&mut conn)?.is_empty());
        let ledger_rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))?;
        assert_eq!(ledger_rows, 2);
        Ok(())
    }

    #[test]
    fn partially_migrated_file_only_runs_the_rest() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        {
            let tx = conn.transaction()?;
            apply_migration(&tx, &MIGRATIONS[0])?;
            tx.commit()?;
        }
        assert_eq!(schema_version(&conn)?, 1);
        assert_eq!(run_migrations(&mut conn)?, vec![2]);
        Ok(())
    }

    #[test]
    fn newer_file_is_refused() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (99, 'future', 'x')",
            [],
        )?;
        assert!(run_migrations(&mut conn).is_err());
        Ok(())
    }
}
