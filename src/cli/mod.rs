//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use kv_streamer::application::OutputFormat;

/// kv-streamer - key-value storage and resumable table streaming on `SQLite`.
#[derive(Parser, Debug)]
#[command(name = "kv-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format: json or table.
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Configuration file (defaults to ~/.kv-streamer/config.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configuration.
    #[arg(long)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply or revert the key-value schema.
    Migrate {
        #[command(subcommand)]
        direction: MigrateDirection,
    },

    /// Read a key.
    Get {
        /// Key to read.
        key: String,

        /// Abort instead of reporting an error if the read fails.
        #[arg(long)]
        must: bool,
    },

    /// Insert or update a key.
    Set {
        /// Key to write.
        key: String,

        /// Value to store.
        value: String,
    },

    /// Show the page a cursor is at.
    Cursor {
        /// Cursor key.
        key: String,
    },

    /// Move a cursor back to the first page.
    Reset {
        /// Cursor key.
        key: String,
    },

    /// Stream rows of a table, advancing a stored cursor.
    Stream {
        /// Table to read.
        #[arg(short, long)]
        table: String,

        /// Column giving a stable row order.
        #[arg(short, long, default_value = "id")]
        order_by: String,

        /// Key under which the cursor is stored.
        #[arg(short = 'k', long)]
        cursor_key: String,

        /// Rows per page (defaults to the configured batch size).
        #[arg(short, long)]
        batch_size: Option<u64>,

        /// Number of pages to stream before exiting.
        #[arg(short, long, default_value = "1")]
        passes: usize,
    },

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum MigrateDirection {
    /// Apply pending migrations.
    Up,
    /// Revert applied migrations.
    Down,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigAction {
    /// Write the default configuration file if none exists.
    Init,
    /// Print the effective configuration.
    Show,
}

impl Cli {
    /// Parse the output format argument.
    pub fn output_format(&self) -> Result<OutputFormat, String> {
        self.format.parse()
    }
}
