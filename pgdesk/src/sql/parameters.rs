//! Placeholder scanning for user-written SQL
//!
//! Recognises `:name`, `$name` and bare `?` placeholders with three regex
//! passes. This is a best-effort text scan, not a lexer: a match is ignored
//! when the text before it holds an odd number of single or double quotes, or
//! when a `--` comment opens earlier on the same line.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::traits::DatabaseError;

lazy_static! {
    static ref NAMED_PARAMETER: Regex = Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    static ref DOLLAR_PARAMETER: Regex = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    static ref POSITIONAL_PARAMETER: Regex = Regex::new(r"\?").unwrap();
    static ref BETWEEN_LOWER_BOUND: Regex = Regex::new(r"BETWEEN\s+\S+\s+AND$").unwrap();
}

/// How many bytes before a placeholder are inspected for type hints
const CONTEXT_WINDOW: usize = 48;

/// Placeholder syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterStyle {
    /// `:name`
    Colon,
    /// `$name`
    Dollar,
    /// `?`
    Positional,
}

/// Display type guessed for a parameter input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Date,
}

/// A placeholder found in SQL text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlParameter {
    /// Parameter name; positional placeholders are named `param1`, `param2`, ...
    pub name: String,
    pub style: ParameterStyle,
    pub parameter_type: ParameterType,
    /// Byte offset of the first occurrence
    pub position: usize,
    pub occurrences: usize,
}

#[derive(Debug, Clone)]
struct Occurrence {
    start: usize,
    end: usize,
    name: String,
    style: ParameterStyle,
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Whether `offset` sits inside a quoted literal/identifier or a line comment
fn is_quoted_or_commented(sql: &str, offset: usize) -> bool {
    let before = &sql[..offset];
    let single_quotes = before.bytes().filter(|byte| *byte == b'\'').count();
    let double_quotes = before.bytes().filter(|byte| *byte == b'"').count();
    if single_quotes % 2 == 1 || double_quotes % 2 == 1 {
        return true;
    }

    let line_start = before.rfind('\n').map(|index| index + 1).unwrap_or(0);
    before[line_start..].contains("--")
}

fn occurrences(sql: &str) -> Vec<Occurrence> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();

    for captures in NAMED_PARAMETER.captures_iter(sql) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let start = whole.start();
        // `::type` casts and `arr[1:n]` slices
        if start > 0 && (bytes[start - 1] == b':' || is_word_byte(bytes[start - 1])) {
            continue;
        }
        if is_quoted_or_commented(sql, start) {
            continue;
        }
        found.push(Occurrence {
            start,
            end: whole.end(),
            name: captures[1].to_string(),
            style: ParameterStyle::Colon,
        });
    }

    for captures in DOLLAR_PARAMETER.captures_iter(sql) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let (start, end) = (whole.start(), whole.end());
        // dollar-quote tags like `$body$`, and `$` inside identifiers
        if bytes.get(end) == Some(&b'$') {
            continue;
        }
        if start > 0 && (bytes[start - 1] == b'$' || is_word_byte(bytes[start - 1])) {
            continue;
        }
        if is_quoted_or_commented(sql, start) {
            continue;
        }
        found.push(Occurrence {
            start,
            end,
            name: captures[1].to_string(),
            style: ParameterStyle::Dollar,
        });
    }

    let mut positional = Vec::new();
    for whole in POSITIONAL_PARAMETER.find_iter(sql) {
        let start = whole.start();
        // JSONB `?|` and `?&` operators
        if matches!(bytes.get(start + 1), Some(b'|') | Some(b'&')) {
            continue;
        }
        if is_quoted_or_commented(sql, start) {
            continue;
        }
        positional.push((start, whole.end()));
    }
    for (index, (start, end)) in positional.into_iter().enumerate() {
        found.push(Occurrence {
            start,
            end,
            name: format!("param{}", index + 1),
            style: ParameterStyle::Positional,
        });
    }

    found.sort_by_key(|occurrence| occurrence.start);
    found
}

fn context_before(sql: &str, offset: usize) -> String {
    let mut start = offset.saturating_sub(CONTEXT_WINDOW);
    while !sql.is_char_boundary(start) {
        start += 1;
    }
    sql[start..offset].trim_end().to_uppercase()
}

fn last_word(context: &str) -> &str {
    context
        .rsplit(|character: char| character.is_whitespace() || character == '(')
        .next()
        .unwrap_or("")
}

/// Guess a display type from the parameter name and the SQL just before it
pub fn infer_parameter_type(name: &str, context: &str) -> ParameterType {
    let name = name.to_lowercase();

    if ["is_", "has_", "can_", "should_"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
        || ["active", "enabled", "deleted", "verified", "flag"].contains(&name.as_str())
    {
        return ParameterType::Boolean;
    }

    if name.contains("date")
        || name.contains("time")
        || name.ends_with("_at")
        || name.ends_with("_on")
        || ["since", "until", "birthday", "day"].contains(&name.as_str())
    {
        return ParameterType::Date;
    }

    let keyword = last_word(context);
    match keyword {
        "LIMIT" | "OFFSET" | "FETCH" => return ParameterType::Number,
        "DATE" | "TIMESTAMP" | "TIMESTAMPTZ" => return ParameterType::Date,
        _ => {}
    }

    if [">", "<", ">=", "<=", "BETWEEN"].contains(&keyword) || BETWEEN_LOWER_BOUND.is_match(context)
    {
        return ParameterType::Number;
    }

    if name == "id"
        || name.ends_with("_id")
        || ["count", "amount", "price", "total", "quantity", "qty", "limit", "offset"]
            .iter()
            .any(|suffix| name.ends_with(suffix))
        || ["age", "page", "size", "number", "num", "year", "month"].contains(&name.as_str())
    {
        return ParameterType::Number;
    }

    ParameterType::String
}

/// Find all placeholders in `sql`, de-duplicated by name, in order of first occurrence
pub fn scan_parameters(sql: &str) -> Vec<SqlParameter> {
    let mut parameters: Vec<SqlParameter> = Vec::new();
    let mut index_by_name: HashMap<String, usize> = HashMap::new();

    for occurrence in occurrences(sql) {
        if let Some(&index) = index_by_name.get(&occurrence.name) {
            parameters[index].occurrences += 1;
            continue;
        }

        let context = context_before(sql, occurrence.start);
        index_by_name.insert(occurrence.name.clone(), parameters.len());
        parameters.push(SqlParameter {
            parameter_type: infer_parameter_type(&occurrence.name, &context),
            name: occurrence.name,
            style: occurrence.style,
            position: occurrence.start,
            occurrences: 1,
        });
    }

    parameters
}

/// Rewrite placeholders to native `$1..$n` and order the supplied values to match
///
/// Repeated names reuse their index. Positional `?` values may be supplied as
/// `param1`/`1`. SQL without recognised placeholders passes through, with any
/// numerically keyed values bound in key order for native `$1` style SQL.
pub fn bind_parameters(
    sql: &str,
    values: &serde_json::Map<String, Value>,
) -> Result<(String, Vec<Value>), DatabaseError> {
    let found = occurrences(sql);

    if found.is_empty() {
        let mut numbered: Vec<(usize, &Value)> = values
            .iter()
            .filter_map(|(key, value)| key.parse::<usize>().ok().map(|index| (index, value)))
            .collect();
        numbered.sort_by_key(|(index, _)| *index);
        return Ok((sql.to_string(), numbered.into_iter().map(|(_, value)| value.clone()).collect()));
    }

    let mut rewritten = String::with_capacity(sql.len());
    let mut bound: Vec<Value> = Vec::new();
    let mut index_by_name: HashMap<String, usize> = HashMap::new();
    let mut missing: Vec<String> = Vec::new();
    let mut cursor = 0;

    for occurrence in found {
        rewritten.push_str(&sql[cursor..occurrence.start]);
        cursor = occurrence.end;

        let index = match index_by_name.get(&occurrence.name) {
            Some(index) => *index,
            None => {
                let value = values.get(&occurrence.name).or_else(|| {
                    occurrence
                        .name
                        .strip_prefix("param")
                        .and_then(|number| values.get(number))
                });
                match value {
                    Some(value) => bound.push(value.clone()),
                    None => {
                        missing.push(occurrence.name.clone());
                        bound.push(Value::Null);
                    }
                }
                index_by_name.insert(occurrence.name.clone(), bound.len());
                bound.len()
            }
        };
        rewritten.push_str(&format!("${}", index));
    }
    rewritten.push_str(&sql[cursor..]);

    if !missing.is_empty() {
        return Err(DatabaseError::InvalidRequest(format!(
            "missing values for parameters: {}",
            missing.join(", ")
        )));
    }

    Ok((rewritten, bound))
}
