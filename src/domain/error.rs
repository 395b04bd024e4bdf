//! Domain-level error types for kv-streamer.
//!
//! All errors are typed with `thiserror` and carry the key, page or element
//! position they were raised for, so callers can tell which batch failed.

use thiserror::Error;

/// Boxed error produced by caller-supplied sources and handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// A key-value query failed for a reason other than "no rows".
    #[error("Query error: failed to {operation} key '{key}': {source}")]
    Query {
        operation: &'static str,
        key: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A transaction could not be started or committed, typically because
    /// another connection held the write lock past the busy timeout.
    #[error("Transaction error: failed to {operation}: {source}")]
    Transaction {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// A locking read was issued on a connection with no open transaction.
    #[error("Locking read of key '{key}' requires an open transaction")]
    LockOutsideTransaction { key: String },

    /// The stored cursor value is not a non-negative integer.
    #[error("Cursor '{key}' is corrupt (stored value {value:?}): {reason}")]
    CursorCorrupt {
        key: String,
        value: String,
        reason: String,
    },

    /// The paginated source failed to produce a page.
    #[error("Source error: failed to select page {page_number}: {source}")]
    Source {
        page_number: u64,
        #[source]
        source: BoxError,
    },

    /// The per-element handler failed.
    #[error("Handler error: failed to process entity at index {index}: {source}")]
    Handler {
        index: usize,
        #[source]
        source: BoxError,
    },

    /// The execution context was cancelled before an element was processed.
    #[error("Processing cancelled before entity at index {index}")]
    Cancelled { index: usize },

    /// Failed to parse or apply a schema migration.
    #[error("Migration error: {message}")]
    Migration {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// Failed to open or configure the database.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON serialization failed.
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Invalid input data.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Create a database error from rusqlite error.
    pub fn database(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a query error for an operation on a key.
    ///
    /// Returns a closure so it reads naturally inside `map_err`.
    pub fn query(
        operation: &'static str,
        key: impl Into<String>,
    ) -> impl FnOnce(rusqlite::Error) -> Self {
        let key = key.into();
        move |source| Self::Query {
            operation,
            key,
            source,
        }
    }

    /// Create a transaction error for `operation` ("begin" or "commit").
    pub fn transaction(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Transaction { operation, source }
    }

    /// Attaches the key a transaction was opened for.
    ///
    /// Turns [`AppError::Transaction`] into [`AppError::Query`] on `key`;
    /// other errors are returned unchanged.
    #[must_use]
    pub fn for_key(self, key: &str) -> Self {
        match self {
            Self::Transaction { operation, source } => Self::Query {
                operation,
                key: key.to_string(),
                source,
            },
            other => other,
        }
    }

    /// Create a JSON error.
    pub fn json(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a migration error with context.
    pub fn migration(message: impl Into<String>, err: rusqlite::Error) -> Self {
        Self::Migration {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create a corrupt-cursor error.
    pub fn cursor_corrupt(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::CursorCorrupt {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_carries_key() {
        let err = AppError::query("get", "cursor:events")(rusqlite::Error::QueryReturnedNoRows);
        let msg = err.to_string();
        assert!(msg.contains("cursor:events"));
        assert!(msg.contains("get"));
    }

    #[test]
    fn test_for_key_only_rewrites_transaction_errors() {
        let err = AppError::transaction("begin")(rusqlite::Error::InvalidQuery).for_key("c");
        assert!(matches!(err, AppError::Query { operation: "begin", ref key, .. } if key == "c"));

        let err = AppError::Cancelled { index: 2 }.for_key("c");
        assert!(matches!(err, AppError::Cancelled { index: 2 }));
    }

    #[test]
    fn test_handler_error_keeps_source() {
        let err = AppError::Handler {
            index: 3,
            source: "boom".into(),
        };
        assert!(err.to_string().contains("index 3"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
