//! Database migrations

use rusqlite::Connection;
use tracing::debug;

use crate::error::{LadderError, Result};

const MIGRATIONS: [&str; 3] = [
    include_str!("../../migrations/001_initial_schema.sql"),
    include_str!("../../migrations/002_add_verifications.sql"),
    include_str!("../../migrations/003_ledger_append_only.sql"),
];

pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Run all pending migrations, tracked through `PRAGMA user_version`.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    let current_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let target_version = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        if current_version >= target_version {
            continue;
        }

        conn.execute_batch(sql).map_err(|err| {
            LadderError::TransactionFailed(format!("migration {target_version} failed: {err}"))
        })?;
        conn.pragma_update(None, "user_version", target_version)
            .map_err(|err| {
                LadderError::TransactionFailed(format!(
                    "failed to set user_version {target_version}: {err}"
                ))
            })?;
        debug!("Applied migration {}", target_version);
    }

    Ok(SCHEMA_VERSION)
}
