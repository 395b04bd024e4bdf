//! Configuration models.
//!
//! Every field has a serde default so a partial (or empty) config file
//! still yields a usable configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `SQLite` journal mode applied to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Write-ahead logging; readers never block the cursor writer.
    #[default]
    Wal,
    /// Rollback journal.
    Delete,
}

impl JournalMode {
    /// Value for `PRAGMA journal_mode`.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file; defaults to `<data_dir>/kv.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// How long a connection waits for a competing lock holder, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Journal mode.
    #[serde(default)]
    pub journal_mode: JournalMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: JournalMode::default(),
        }
    }
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Streamer defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamerConfig {
    /// Number of entities fetched per page.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Page size used when none is configured.
pub const DEFAULT_BATCH_SIZE: u64 = 15;

const fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Streamer configuration.
    #[serde(default)]
    pub streamer: StreamerConfig,

    /// Path configuration.
    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kv-streamer")
    }

    /// Get the database file path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir().join("kv.db"))
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_file_path(&self) -> PathBuf {
        self.data_dir().join("config.toml")
    }
}
