//! Domain models for the key-value store and paginated sources.

use serde::{Deserialize, Serialize};

/// A single row of the `key_value` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Unique key.
    pub key: String,
    /// Stored value.
    pub value: String,
}

impl KeyValue {
    /// Create a new key-value pair.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Limit/offset pagination parameters. Page 0 is the first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetPageParams {
    /// Maximum number of entities in a page.
    pub limit: u64,
    /// Zero-based page number.
    pub page_number: u64,
}

impl OffsetPageParams {
    /// Create page parameters.
    #[must_use]
    pub const fn new(limit: u64, page_number: u64) -> Self {
        Self { limit, page_number }
    }

    /// Number of entities to skip before this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.limit.saturating_mul(self.page_number)
    }
}
