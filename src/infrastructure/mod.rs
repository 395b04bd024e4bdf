//! Infrastructure layer - external adapters (database, filesystem).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod config;
pub mod database;
pub mod key_value;
pub mod migrations;
pub mod table_source;

pub use config::{
    config_file_path, ensure_config_exists, load_config, load_config_from_file, save_config,
};
pub use database::Database;
pub use key_value::{KeyValueQ, SqliteKeyValueQ};
pub use migrations::KeyValueMigrator;
pub use table_source::SqliteTableSource;
