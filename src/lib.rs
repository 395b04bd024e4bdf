//! kv-streamer - a `SQLite` key-value table and a resumable batch streamer.
//!
//! The [`KeyValueQ`] store reads, locks and upserts rows of a `key_value`
//! table. The [`Streamer`] walks any [`Streamable`] source page by page,
//! keeping its page cursor in that table so processing resumes across
//! restarts and can be shared between concurrent workers.
//!
//! ```no_run
//! use kv_streamer::{Database, Streamer, StreamerInitParams};
//!
//! # fn main() -> kv_streamer::Result<()> {
//! let db = Database::new("kv.db");
//! db.migrator().migrate_up()?;
//!
//! let streamer = Streamer::new(StreamerInitParams {
//!     stream: vec!["a", "b", "c"],
//!     key_value_q: db.key_value_q()?,
//!     key_value_key: "letters".to_string(),
//!     batch_size: Some(2),
//!     context: None,
//! })?;
//!
//! streamer.form_list_and_process(|_ctx, letter| {
//!     println!("{letter}");
//!     Ok::<_, kv_streamer::BoxError>(())
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{read_current_page, reset_cursor, Streamer, StreamerInitParams};
pub use domain::{
    AppConfig, AppError, BoxError, Context, KeyValue, OffsetPageParams, Result, Streamable,
};
pub use infrastructure::{
    Database, KeyValueMigrator, KeyValueQ, SqliteKeyValueQ, SqliteTableSource,
};
