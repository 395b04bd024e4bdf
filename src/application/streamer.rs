//! Resumable round-robin streaming over a paginated source.
//!
//! The current page number lives in the key-value table under a caller
//! chosen key, so a streamer picks up where the previous process left off.
//! Every read-modify-write of the cursor runs in one transaction behind a
//! locking read; concurrent streamers sharing a key never read the same page.
//!
//! The cursor is advanced before entities are handed to the caller. A batch
//! whose handler fails is not retried on the next call.

use crate::domain::{
    AppError, BoxError, Context, KeyValue, OffsetPageParams, Result, Streamable,
    DEFAULT_BATCH_SIZE,
};
use crate::infrastructure::KeyValueQ;

/// Parameters for [`Streamer::new`].
///
/// `batch_size` defaults to 15 and `context` to [`Context::background`].
pub struct StreamerInitParams<S, Q> {
    pub stream: S,
    pub key_value_q: Q,
    pub key_value_key: String,
    pub batch_size: Option<u64>,
    pub context: Option<Context>,
}

/// Streams through a source page by page, wrapping around at the end.
pub struct Streamer<S, Q> {
    stream: S,
    key_value_q: Q,
    key_value_key: String,
    batch_size: u64,
    context: Context,
}

impl<S, Q> Streamer<S, Q>
where
    S: Streamable,
    Q: KeyValueQ,
{
    /// Create a streamer.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] if the cursor key is empty or the batch size is zero.
    pub fn new(params: StreamerInitParams<S, Q>) -> Result<Self> {
        if params.key_value_key.is_empty() {
            return Err(AppError::Config {
                message: "Streamer cursor key must not be empty".into(),
            });
        }

        let batch_size = params.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(AppError::Config {
                message: "Streamer batch size must be positive".into(),
            });
        }

        Ok(Self {
            stream: params.stream,
            key_value_q: params.key_value_q,
            key_value_key: params.key_value_key,
            batch_size,
            context: params.context.unwrap_or_default(),
        })
    }

    /// Key under which the cursor is stored.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key_value_key
    }

    /// Number of entities per page.
    #[must_use]
    pub const fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Returns a batch of entities at `page_number`, without touching the cursor.
    ///
    /// # Errors
    /// Returns [`AppError::Source`] if the source fails.
    pub fn select(&self, page_number: u64) -> Result<Vec<S::Item>> {
        self.stream
            .select_with_page_params(OffsetPageParams::new(self.batch_size, page_number))
            .map_err(|source| AppError::Source {
                page_number,
                source,
            })
    }

    /// Returns the page the stream is at.
    ///
    /// An absent cursor is page 0; nothing is written.
    ///
    /// # Errors
    /// Returns [`AppError::CursorCorrupt`] if the stored value is not a
    /// non-negative integer, or a query error.
    pub fn get_current_page(&self) -> Result<u64> {
        read_current_page(&self.key_value_q, &self.key_value_key)
    }

    /// Moves the cursor back to the first page.
    ///
    /// # Errors
    /// Returns error if the cursor cannot be stored.
    pub fn reset(&self) -> Result<()> {
        reset_cursor(&self.key_value_q, &self.key_value_key)
    }

    /// Returns the next batch of entities and moves the cursor to the next
    /// page, or back to the first page once the end of the source is reached.
    ///
    /// An empty result means the source has no entities at all.
    ///
    /// # Errors
    /// Returns error if the cursor cannot be read or stored, or the source
    /// fails. The cursor is left unchanged in that case.
    pub fn form_list(&self) -> Result<Vec<S::Item>> {
        self.key_value_q
            .transaction(|q| self.form_list_locked(q))
            .map_err(|e| e.for_key(&self.key_value_key))
    }

    /// Forms a list with [`Streamer::form_list`] and applies `handler` to each
    /// entity in page order, returning how many were processed.
    ///
    /// A context cancelled before the call leaves the cursor where it is.
    ///
    /// # Errors
    /// Stops at the first failing entity with [`AppError::Handler`], or with
    /// [`AppError::Cancelled`] once the context is cancelled.
    pub fn form_list_and_process<F, E>(&self, mut handler: F) -> Result<usize>
    where
        F: FnMut(&Context, S::Item) -> std::result::Result<(), E>,
        E: Into<BoxError>,
    {
        if self.context.is_cancelled() {
            tracing::info!(key = %self.key_value_key, "Processing cancelled before forming a list");
            return Err(AppError::Cancelled { index: 0 });
        }

        let entities = self.form_list()?;
        let total = entities.len();

        for (index, entity) in entities.into_iter().enumerate() {
            if self.context.is_cancelled() {
                tracing::info!(key = %self.key_value_key, index, total, "Processing cancelled");
                return Err(AppError::Cancelled { index });
            }

            handler(&self.context, entity).map_err(|e| AppError::Handler {
                index,
                source: e.into(),
            })?;
        }

        Ok(total)
    }

    fn form_list_locked(&self, q: &Q) -> Result<Vec<S::Item>> {
        let mut wrapped = false;

        loop {
            let page_number = locked_page(q, &self.key_value_key)?;
            let entities = self.select(page_number)?;

            if !entities.is_empty() {
                let next = page_number.checked_add(1).ok_or_else(|| {
                    AppError::cursor_corrupt(
                        &self.key_value_key,
                        page_number.to_string(),
                        "cursor cannot advance past u64::MAX",
                    )
                })?;
                q.upsert(&KeyValue::new(&self.key_value_key, next.to_string()))?;

                tracing::debug!(
                    key = %self.key_value_key,
                    page = page_number,
                    entities = entities.len(),
                    "Advanced cursor"
                );

                return Ok(entities);
            }

            if page_number == 0 {
                tracing::warn!(key = %self.key_value_key, "Entities list is empty");
                return Ok(entities);
            }

            // Only reachable if the reset below did not stick
            if wrapped {
                return Err(AppError::cursor_corrupt(
                    &self.key_value_key,
                    page_number.to_string(),
                    "cursor was not reset to the first page",
                ));
            }

            q.upsert(&KeyValue::new(&self.key_value_key, "0"))?;
            wrapped = true;

            tracing::info!(
                key = %self.key_value_key,
                from_page = page_number,
                "Reached end of source, starting from the first page"
            );
        }
    }
}

/// Reads the page the cursor under `key` is at, in its own transaction.
///
/// # Errors
/// Returns [`AppError::CursorCorrupt`] if the stored value is not a
/// non-negative integer, or a query error.
pub fn read_current_page<Q: KeyValueQ>(q: &Q, key: &str) -> Result<u64> {
    q.transaction(|q| locked_page(q, key))
        .map_err(|e| e.for_key(key))
}

/// Moves the cursor under `key` back to the first page.
///
/// # Errors
/// Returns a query error if the cursor cannot be stored.
pub fn reset_cursor<Q: KeyValueQ>(q: &Q, key: &str) -> Result<()> {
    q.upsert(&KeyValue::new(key, "0"))
}

/// Locking read of a cursor; must run inside a transaction.
fn locked_page<Q: KeyValueQ>(q: &Q, key: &str) -> Result<u64> {
    match q.locking_get(key)? {
        Some(cursor) => parse_cursor(key, &cursor.value),
        None => Ok(0),
    }
}

fn parse_cursor(key: &str, value: &str) -> Result<u64> {
    let page = value
        .parse::<i128>()
        .map_err(|e| AppError::cursor_corrupt(key, value, e.to_string()))?;

    if page < 0 {
        return Err(AppError::cursor_corrupt(key, value, "cursor cannot be negative"));
    }

    u64::try_from(page).map_err(|e| AppError::cursor_corrupt(key, value, e.to_string()))
}
