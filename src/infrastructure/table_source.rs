//! Paginated source over an arbitrary `SQLite` table.
//!
//! Rows are returned as JSON objects keyed by column name.

use std::fmt::Write as _;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::domain::{AppError, BoxError, OffsetPageParams, Result, Streamable};

use super::database::Database;

/// Pages through `table` ordered by `order_by`.
pub struct SqliteTableSource {
    conn: Connection,
    query: String,
    table: String,
}

impl SqliteTableSource {
    /// Opens a source over `table`, ordered by the `order_by` column.
    ///
    /// # Errors
    /// Returns error if either name is not a plain SQL identifier or the
    /// connection cannot be opened.
    pub fn open(db: &Database, table: &str, order_by: &str) -> Result<Self> {
        validate_identifier(table)?;
        validate_identifier(order_by)?;

        let conn = db.connect()?;
        conn.execute_batch("PRAGMA query_only = ON;")
            .map_err(AppError::database)?;

        Ok(Self {
            conn,
            query: format!(r#"SELECT * FROM "{table}" ORDER BY "{order_by}" LIMIT ?1 OFFSET ?2"#),
            table: table.to_string(),
        })
    }

    fn fetch_page(&self, params: OffsetPageParams) -> rusqlite::Result<Vec<Value>> {
        let limit = i64::try_from(params.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(params.offset()).unwrap_or(i64::MAX);

        let mut stmt = self.conn.prepare_cached(&self.query)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt.query_map([limit, offset], |row| {
            let mut object = Map::with_capacity(columns.len());
            for (i, name) in columns.iter().enumerate() {
                object.insert(name.clone(), to_json(row.get_ref(i)?));
            }
            Ok(Value::Object(object))
        })?;

        let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        tracing::debug!(
            table = %self.table,
            page = params.page_number,
            rows = entries.len(),
            "Fetched page"
        );

        Ok(entries)
    }
}

impl Streamable for SqliteTableSource {
    type Item = Value;

    fn select_with_page_params(
        &self,
        params: OffsetPageParams,
    ) -> std::result::Result<Vec<Value>, BoxError> {
        Ok(self.fetch_page(params)?)
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`.
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidData {
            message: format!("Not a valid SQL identifier: {name:?}"),
        })
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => {
            let mut hex = String::with_capacity(b.len() * 2);
            for byte in b {
                let _ = write!(hex, "{byte:02x}");
            }
            Value::String(hex)
        }
    }
}
