//! Application layer - use cases and orchestration.
//!
//! This layer contains the cursor streaming protocol and the
//! formatting of its results.

pub mod formatter;
pub mod streamer;

pub use formatter::{
    format_key_value_json, format_key_value_table, format_pass_summary, format_row_json,
    format_rows_table, OutputFormat,
};
pub use streamer::{read_current_page, reset_cursor, Streamer, StreamerInitParams};
