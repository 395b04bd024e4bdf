//! Domain layer - core types, configuration and errors.
//!
//! This layer contains pure domain models and error types
//! without any I/O of its own.

pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod source;

pub use config::{
    AppConfig, DatabaseConfig, JournalMode, PathConfig, StreamerConfig, DEFAULT_BATCH_SIZE,
};
pub use context::Context;
pub use error::{AppError, BoxError, Result};
pub use models::{KeyValue, OffsetPageParams};
pub use source::Streamable;
