//! Embedded schema migrations for the key-value table.
//!
//! Scripts live in `migrations/` and are compiled into the binary. Each
//! script has an `-- +migrate Up` section followed by an `-- +migrate Down`
//! section. Applied scripts are recorded in `kv_streamer_migrations`.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::domain::{AppError, Result};

use super::database::Database;

const UP_MARKER: &str = "-- +migrate Up";
const DOWN_MARKER: &str = "-- +migrate Down";

/// Embedded scripts, in application order.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_create_key_value",
    include_str!("../../migrations/0001_create_key_value.sql"),
)];

/// A parsed migration script.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Migration {
    id: &'static str,
    up: String,
    down: String,
}

/// Splits a script into its up and down sections.
fn parse_migration(id: &'static str, source: &str) -> Result<Migration> {
    let invalid = |message: &str| AppError::Migration {
        message: format!("Migration {id}: {message}"),
        source: None,
    };

    let up_start = source
        .find(UP_MARKER)
        .ok_or_else(|| invalid("missing up section"))?;
    let down_start = source
        .find(DOWN_MARKER)
        .ok_or_else(|| invalid("missing down section"))?;

    if down_start < up_start {
        return Err(invalid("down section must follow up section"));
    }

    Ok(Migration {
        id,
        up: source[up_start + UP_MARKER.len()..down_start].trim().to_string(),
        down: source[down_start + DOWN_MARKER.len()..].trim().to_string(),
    })
}

fn embedded_migrations() -> Result<Vec<Migration>> {
    MIGRATIONS
        .iter()
        .map(|(id, source)| parse_migration(id, source))
        .collect()
}

/// Applies and reverts the key-value schema.
#[derive(Debug, Clone)]
pub struct KeyValueMigrator {
    db: Database,
}

impl KeyValueMigrator {
    /// Create a migrator for `db`.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Applies all pending migrations, returning how many were applied.
    ///
    /// # Errors
    /// Returns error if a script fails; earlier scripts stay applied.
    pub fn migrate_up(&self) -> Result<usize> {
        let mut conn = self.db.connect()?;
        ensure_history_table(&conn)?;

        let applied_ids = applied_ids(&conn)?;
        let mut applied = 0;

        for migration in embedded_migrations()? {
            if applied_ids.iter().any(|id| id == migration.id) {
                continue;
            }

            let tx = conn
                .transaction()
                .map_err(|e| AppError::migration("Failed to begin migration", e))?;
            tx.execute_batch(&migration.up).map_err(|e| {
                AppError::migration(format!("Failed to apply {}", migration.id), e)
            })?;
            tx.execute(
                "INSERT INTO kv_streamer_migrations (id, applied_at) VALUES (?1, ?2)",
                params![migration.id, Utc::now().to_rfc3339()],
            )
            .map_err(|e| AppError::migration("Failed to record migration", e))?;
            tx.commit()
                .map_err(|e| AppError::migration("Failed to commit migration", e))?;

            tracing::debug!(id = migration.id, "Applied migration");
            applied += 1;
        }

        tracing::info!(applied, "key value migrations applied");

        Ok(applied)
    }

    /// Reverts all applied migrations, newest first, returning how many were reverted.
    ///
    /// # Errors
    /// Returns error if a script fails; later scripts stay reverted.
    pub fn migrate_down(&self) -> Result<usize> {
        let mut conn = self.db.connect()?;
        ensure_history_table(&conn)?;

        let applied_ids = applied_ids(&conn)?;
        let mut reverted = 0;

        for migration in embedded_migrations()?.iter().rev() {
            if !applied_ids.iter().any(|id| id == migration.id) {
                continue;
            }

            let tx = conn
                .transaction()
                .map_err(|e| AppError::migration("Failed to begin migration", e))?;
            tx.execute_batch(&migration.down).map_err(|e| {
                AppError::migration(format!("Failed to revert {}", migration.id), e)
            })?;
            tx.execute(
                "DELETE FROM kv_streamer_migrations WHERE id = ?1",
                [migration.id],
            )
            .map_err(|e| AppError::migration("Failed to record migration", e))?;
            tx.commit()
                .map_err(|e| AppError::migration("Failed to commit migration", e))?;

            tracing::debug!(id = migration.id, "Reverted migration");
            reverted += 1;
        }

        tracing::info!(applied = reverted, "key value migrations reverted");

        Ok(reverted)
    }
}

fn ensure_history_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv_streamer_migrations (
            id TEXT PRIMARY KEY NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )
    .map_err(|e| AppError::migration("Failed to create migration history", e))
}

fn applied_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM kv_streamer_migrations ORDER BY id")
        .map_err(|e| AppError::migration("Failed to read migration history", e))?;

    let rows = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| AppError::migration("Failed to read migration history", e))?;

    rows.collect::<rusqlite::Result<Vec<String>>>()
        .map_err(|e| AppError::migration("Failed to read migration history", e))
}
