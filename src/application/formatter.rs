//! Output formatting for key-value rows and streamed pages.
//!
//! Supports JSON and table output.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use serde_json::Value;

use crate::domain::KeyValue;

/// Output format options.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// JSON for programmatic use (one document per line when streaming).
    Json,
    /// Human-readable table.
    #[default]
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(format!("Unknown format: {s}. Use: json, table")),
        }
    }
}

/// Formats a key-value row as a two-column table.
pub fn format_key_value_table(kv: &KeyValue) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Key", "Value"]);
    table.add_row(vec![truncate(&kv.key, 40), truncate(&kv.value, 60)]);
    table.to_string()
}

/// Formats a key-value row as JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_key_value_json(kv: &KeyValue) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(kv)
}

/// Formats streamed rows as a table, one column per distinct field.
pub fn format_rows_table(rows: &[Value]) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        if let Value::Object(object) = row {
            for name in object.keys() {
                if !columns.contains(&name.as_str()) {
                    columns.push(name);
                }
            }
        }
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(columns.clone());

    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|name| row.get(*name).map_or_else(|| "-".to_string(), cell_text))
            .collect();
        table.add_row(cells);
    }

    table.to_string()
}

/// Formats one streamed row as a single JSON line.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_row_json(row: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(row)
}

/// Formats the outcome of one streamer pass for display.
pub fn format_pass_summary(pass: usize, key: &str, processed: usize, page: u64) -> String {
    if processed == 0 {
        format!(
            "{} pass {}: cursor '{}' found no entities",
            "∅".yellow(),
            pass,
            key.cyan()
        )
    } else {
        format!(
            "{} pass {}: {} entities, cursor '{}' now at page {}",
            "✓".green(),
            pass,
            processed.to_string().cyan(),
            key.cyan(),
            page.to_string().bold()
        )
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => truncate(s, 40),
        other => truncate(&other.to_string(), 40),
    }
}

/// Truncates a string to max length with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world!", 8), "hello...");
        assert_eq!(truncate("héllo wörld!", 8), "héllo...");
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!(matches!("TABLE".parse::<OutputFormat>(), Ok(OutputFormat::Table)));
        assert!("markdown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_rows_table_unions_columns() {
        let rows = vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "extra": null})];
        let table = format_rows_table(&rows);

        assert!(table.contains("extra"));
        assert!(table.contains("NULL"));
        assert!(table.contains('-'));
    }

    #[test]
    fn test_key_value_json() {
        let out = format_key_value_json(&KeyValue::new("cursor", "3")).unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!({"key": "cursor", "value": "3"}));
    }

    #[test]
    fn test_row_json_is_single_line() {
        let line = format_row_json(&json!({"id": 1, "name": "a\nb"})).unwrap();
        assert!(!line.contains('\n'));
    }
}
