//! `SQLite` database handle.
//!
//! A `Database` is cheap to clone and only remembers where the file lives
//! and how connections are configured; every scope gets its own connection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use crate::domain::{AppConfig, AppError, DatabaseConfig, JournalMode, Result};

use super::key_value::SqliteKeyValueQ;
use super::migrations::KeyValueMigrator;

/// Shared handle to a `SQLite` database file.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
    journal_mode: JournalMode,
}

impl Database {
    /// Handle for `path` with default connection settings.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, &DatabaseConfig::default())
    }

    /// Handle for `path` configured from `config`.
    #[must_use]
    pub fn with_config(path: impl Into<PathBuf>, config: &DatabaseConfig) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            journal_mode: config.journal_mode,
        }
    }

    /// Handle for the database named by the application config.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::with_config(config.database_path(), &config.database)
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a new connection with the configured pragmas.
    ///
    /// # Errors
    /// Returns error if the directory or database cannot be created or configured.
    pub fn connect(&self) -> Result<Connection> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::io("Failed to create database directory", e))?;
            }
        }

        let conn = Connection::open(&self.path).map_err(AppError::database)?;

        conn.busy_timeout(self.busy_timeout)
            .map_err(AppError::database)?;

        // journal_mode returns a row, so it cannot go through execute()
        conn.query_row(
            &format!("PRAGMA journal_mode = {}", self.journal_mode.pragma_value()),
            [],
            |_| Ok(()),
        )
        .map_err(AppError::database)?;

        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(AppError::database)?;

        tracing::debug!(path = %self.path.display(), "Opened database connection");

        Ok(conn)
    }

    /// Opens a key-value querier on a fresh connection.
    ///
    /// # Errors
    /// Returns error if the connection cannot be opened.
    pub fn key_value_q(&self) -> Result<SqliteKeyValueQ> {
        Ok(SqliteKeyValueQ::new(self.clone(), self.connect()?))
    }

    /// Migrator for the key-value schema.
    #[must_use]
    pub fn migrator(&self) -> KeyValueMigrator {
        KeyValueMigrator::new(self.clone())
    }
}
