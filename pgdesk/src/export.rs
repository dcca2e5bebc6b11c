//! Rendering result sets as downloadable files

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::RowQuery;
use crate::sql::{quote_identifier, quote_literal};

/// Output file format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Sql,
    Markdown,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Sql => "sql",
            ExportFormat::Markdown => "md",
        }
    }

    /// MIME type guessed from the file extension
    pub fn content_type(self) -> String {
        mime_guess::from_ext(self.extension())
            .first_or_text_plain()
            .essence_str()
            .to_string()
    }
}

/// Body for exporting a table
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableExportRequest {
    #[serde(default)]
    pub format: ExportFormat,

    #[serde(flatten)]
    pub query: RowQuery,
}

/// Body for exporting the result of a query
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryExportRequest {
    pub sql: String,

    #[serde(default)]
    pub parameters: Map<String, Value>,

    #[serde(default)]
    pub format: ExportFormat,

    /// Base name of the downloaded file, without extension
    #[serde(default)]
    pub file_name: Option<String>,

    /// Target table for `INSERT` statements in SQL exports
    #[serde(default)]
    pub table_name: Option<String>,
}

/// `name.ext` with anything but letters, digits, `-`, `_` and `.` replaced
pub fn file_name(base: &str, format: ExportFormat) -> String {
    let cleaned: String = base
        .trim()
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '-' | '_' | '.') {
                character
            } else {
                '_'
            }
        })
        .collect();
    let stem = if cleaned.trim_matches('_').is_empty() {
        "export"
    } else {
        cleaned.as_str()
    };
    format!("{}.{}", stem, format.extension())
}

/// `Content-Disposition` value for downloading `file_name`
pub fn content_disposition(file_name: &str) -> String {
    format!("attachment; filename=\"{}\"", file_name.replace('"', ""))
}

/// Render rows in `format`
///
/// `target` is the already quoted relation used by SQL `INSERT` statements.
/// When `columns` is empty the keys of the first row are used.
pub fn render(format: ExportFormat, target: &str, columns: &[String], rows: &[Value]) -> String {
    let derived;
    let columns = if columns.is_empty() {
        derived = rows
            .first()
            .and_then(Value::as_object)
            .map(|object| object.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        derived.as_slice()
    } else {
        columns
    };

    match format {
        ExportFormat::Csv => render_csv(columns, rows),
        ExportFormat::Json => render_json(rows),
        ExportFormat::Sql => render_sql(target, columns, rows),
        ExportFormat::Markdown => render_markdown(columns, rows),
    }
}

fn cell<'a>(row: &'a Value, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn render_csv(columns: &[String], rows: &[Value]) -> String {
    let mut output = String::new();
    let header: Vec<String> = columns.iter().map(|column| csv_field(column)).collect();
    output.push_str(&header.join(","));
    output.push_str("\r\n");

    for row in rows {
        let fields: Vec<String> = columns
            .iter()
            .map(|column| csv_field(&plain_text(cell(row, column))))
            .collect();
        output.push_str(&fields.join(","));
        output.push_str("\r\n");
    }
    output
}

fn render_json(rows: &[Value]) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
}

fn sql_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => quote_literal(text),
        other => quote_literal(&other.to_string()),
    }
}

fn render_sql(target: &str, columns: &[String], rows: &[Value]) -> String {
    let column_list = columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");

    rows.iter()
        .map(|row| {
            let values = columns
                .iter()
                .map(|column| sql_value(cell(row, column)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("INSERT INTO {} ({}) VALUES ({});\n", target, column_list, values)
        })
        .collect()
}

fn markdown_cell(text: &str) -> String {
    text.replace('|', "\\|").replace("\r\n", "<br>").replace('\n', "<br>")
}

fn render_markdown(columns: &[String], rows: &[Value]) -> String {
    let mut output = String::new();
    let header: Vec<String> = columns.iter().map(|column| markdown_cell(column)).collect();
    output.push_str(&format!("| {} |\n", header.join(" | ")));
    output.push_str(&format!("|{}\n", " --- |".repeat(columns.len())));

    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|column| markdown_cell(&plain_text(cell(row, column))))
            .collect();
        output.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    output
}
