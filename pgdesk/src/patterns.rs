//! Value pattern detection
//!
//! Guesses what a column holds from a sample of its values so the front-end
//! can offer a fitting filter input. Five independent classifiers score the
//! sample; the first one reaching [`DECISIVE_CONFIDENCE`] wins outright,
//! otherwise the highest score wins (earlier classifiers win ties).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A classifier scoring at least this much ends detection
pub const DECISIVE_CONFIDENCE: f64 = 0.9;

/// More distinct values than this is never an enum
pub const MAX_ENUM_VALUES: usize = 10;

const TRUTHY: &[&str] = &["true", "t", "yes", "y", "1", "on"];
const FALSY: &[&str] = &["false", "f", "no", "n", "0", "off"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdFormat {
    Integer,
    Uuid,
}

/// What a column's values look like
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValuePattern {
    Boolean,
    Enum { values: Vec<String> },
    Id { format: IdFormat },
    #[serde(rename_all = "camelCase")]
    NumericRange { min: f64, max: f64 },
    #[serde(rename_all = "camelCase")]
    Date { earliest: String, latest: String },
}

/// A pattern with the classifier's confidence in `0.0..=1.0`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub pattern: ValuePattern,
    pub confidence: f64,
}

/// Request body for detecting a pattern over posted values
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    /// Column name, used as a hint by the id classifier
    #[serde(default)]
    pub column: String,
    pub values: Vec<Value>,
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.trim().to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(parsed) = DateTime::parse_from_str(text, format) {
            return Some(parsed.naive_utc());
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn detect_boolean(values: &[Value], texts: &[String]) -> Option<PatternMatch> {
    if values.iter().all(Value::is_boolean) {
        return Some(PatternMatch {
            pattern: ValuePattern::Boolean,
            confidence: 1.0,
        });
    }

    let distinct: HashSet<String> = texts.iter().map(|text| text.to_lowercase()).collect();
    if distinct.len() > 2 {
        return None;
    }
    let truthy = distinct.iter().filter(|text| TRUTHY.contains(&text.as_str())).count();
    let falsy = distinct.iter().filter(|text| FALSY.contains(&text.as_str())).count();
    if truthy + falsy != distinct.len() {
        return None;
    }

    let confidence = if distinct.len() == 1 {
        0.6
    } else if truthy != 1 {
        return None;
    } else if distinct.contains("1") && distinct.contains("0") {
        // could just as well be a counter that happens to be 0 or 1
        0.75
    } else {
        0.95
    };

    Some(PatternMatch {
        pattern: ValuePattern::Boolean,
        confidence,
    })
}

fn detect_id(column: &str, texts: &[String]) -> Option<PatternMatch> {
    let lower = column.to_lowercase();
    let named_like_id = lower == "id"
        || lower.ends_with("_id")
        || lower.ends_with("uuid")
        || column.ends_with("Id");

    let format = if texts.iter().all(|text| text.parse::<i64>().is_ok()) {
        IdFormat::Integer
    } else if texts.iter().all(|text| uuid::Uuid::parse_str(text).is_ok()) {
        IdFormat::Uuid
    } else {
        return None;
    };

    let distinct: HashSet<&String> = texts.iter().collect();
    let unique_ratio = distinct.len() as f64 / texts.len() as f64;

    let confidence = if named_like_id {
        (0.7 + 0.25 * unique_ratio).min(0.95)
    } else if format == IdFormat::Uuid && unique_ratio >= 1.0 {
        0.85
    } else {
        return None;
    };

    Some(PatternMatch {
        pattern: ValuePattern::Id { format },
        confidence,
    })
}

fn detect_date(texts: &[String]) -> Option<PatternMatch> {
    let mut parsed = texts
        .iter()
        .map(|text| parse_datetime(text).map(|moment| (moment, text)))
        .collect::<Option<Vec<_>>>()?;
    parsed.sort_by_key(|(moment, _)| *moment);

    let earliest = parsed.first()?.1.clone();
    let latest = parsed.last()?.1.clone();
    Some(PatternMatch {
        pattern: ValuePattern::Date { earliest, latest },
        confidence: 0.9,
    })
}

fn detect_enum(texts: &[String]) -> Option<PatternMatch> {
    if texts.len() < 4 {
        return None;
    }

    let mut frequencies: HashMap<&str, usize> = HashMap::new();
    for text in texts {
        *frequencies.entry(text.as_str()).or_default() += 1;
    }
    if frequencies.len() > MAX_ENUM_VALUES {
        return None;
    }

    let ratio = frequencies.len() as f64 / texts.len() as f64;
    if ratio > 0.5 {
        return None;
    }

    let mut ranked: Vec<(&str, usize)> = frequencies.into_iter().collect();
    ranked.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(right.0)));

    Some(PatternMatch {
        pattern: ValuePattern::Enum {
            values: ranked.into_iter().map(|(value, _)| value.to_string()).collect(),
        },
        confidence: 0.5 + 0.4 * (1.0 - ratio),
    })
}

fn detect_numeric_range(texts: &[String]) -> Option<PatternMatch> {
    let numbers = texts
        .iter()
        .map(|text| text.parse::<f64>().ok().filter(|number| number.is_finite()))
        .collect::<Option<Vec<f64>>>()?;

    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(PatternMatch {
        pattern: ValuePattern::NumericRange { min, max },
        confidence: 0.6,
    })
}

/// Detect the most likely pattern for `column` given sample `values`
///
/// Nulls are ignored; `None` means there was nothing to classify or no
/// classifier matched.
pub fn detect_pattern(column: &str, values: &[Value]) -> Option<PatternMatch> {
    let values: Vec<Value> = values.iter().filter(|value| !value.is_null()).cloned().collect();
    let texts: Vec<String> = values.iter().filter_map(as_text).collect();
    if texts.is_empty() {
        return None;
    }

    let classifiers: [&dyn Fn() -> Option<PatternMatch>; 5] = [
        &|| detect_boolean(&values, &texts),
        &|| detect_id(column, &texts),
        &|| detect_date(&texts),
        &|| detect_enum(&texts),
        &|| detect_numeric_range(&texts),
    ];

    let mut best: Option<PatternMatch> = None;
    for classify in classifiers {
        let Some(candidate) = classify() else {
            continue;
        };
        if candidate.confidence >= DECISIVE_CONFIDENCE {
            return Some(candidate);
        }
        if best
            .as_ref()
            .map(|current| candidate.confidence > current.confidence)
            .unwrap_or(true)
        {
            best = Some(candidate);
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_or_null_samples() {
        assert_eq!(detect_pattern("c", &[]), None);
        assert_eq!(detect_pattern("c", &[Value::Null, Value::Null]), None);
    }

    #[test]
    fn test_native_booleans() {
        let detected = detect_pattern("active", &[json!(true), json!(false), Value::Null]).unwrap();
        assert_eq!(detected.pattern, ValuePattern::Boolean);
        assert_eq!(detected.confidence, 1.0);
    }

    #[test]
    fn test_yes_no_strings_are_boolean() {
        let detected = detect_pattern("newsletter", &[json!("yes"), json!("No"), json!("yes")]).unwrap();
        assert_eq!(detected.pattern, ValuePattern::Boolean);
        assert!(detected.confidence >= DECISIVE_CONFIDENCE);
    }

    #[test]
    fn test_zero_one_is_weak_boolean() {
        let detected = detect_pattern("retries", &[json!(1), json!(0), json!(1), json!(1), json!(0)]).unwrap();
        assert_eq!(detected.pattern, ValuePattern::Boolean);
        assert_eq!(detected.confidence, 0.75);
    }

    #[test]
    fn test_integer_ids() {
        let detected = detect_pattern("user_id", &[json!(1), json!(2), json!(3), json!(4)]).unwrap();
        assert_eq!(detected.pattern, ValuePattern::Id { format: IdFormat::Integer });
        assert!(detected.confidence >= DECISIVE_CONFIDENCE);
    }

    #[test]
    fn test_uuid_ids_without_id_name() {
        let detected = detect_pattern(
            "token",
            &[
                json!("67e55044-10b1-426f-9247-bb680e5fe0c8"),
                json!("a1a2a3a4-b1b2-c1c2-d1d2-d3d4d5d6d7d8"),
            ],
        )
        .unwrap();
        assert_eq!(detected.pattern, ValuePattern::Id { format: IdFormat::Uuid });
        assert_eq!(detected.confidence, 0.85);
    }

    #[test]
    fn test_dates() {
        let detected = detect_pattern(
            "created",
            &[
                json!("2024-03-01 10:00:00+00"),
                json!("2023-12-31"),
                json!("2024-01-15T08:30:00Z"),
            ],
        )
        .unwrap();
        assert_eq!(
            detected.pattern,
            ValuePattern::Date {
                earliest: "2023-12-31".to_string(),
                latest: "2024-03-01 10:00:00+00".to_string(),
            }
        );
    }

    #[test]
    fn test_enum_ranked_by_frequency() {
        let values: Vec<Value> = ["active", "inactive", "active", "pending", "active", "inactive"]
            .iter()
            .map(|value| json!(value))
            .collect();
        let detected = detect_pattern("status", &values).unwrap();
        assert_eq!(
            detected.pattern,
            ValuePattern::Enum {
                values: vec!["active".to_string(), "inactive".to_string(), "pending".to_string()]
            }
        );
        assert!((detected.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_numeric_range() {
        let values: Vec<Value> = [23, 45, 23, 31, 52, 19].iter().map(|value| json!(value)).collect();
        let detected = detect_pattern("age", &values).unwrap();
        assert_eq!(detected.pattern, ValuePattern::NumericRange { min: 19.0, max: 52.0 });
    }

    #[test]
    fn test_free_text_matches_nothing() {
        let values: Vec<Value> = ["alpha", "beta", "gamma", "delta"].iter().map(|value| json!(value)).collect();
        assert_eq!(detect_pattern("word", &values), None);
    }

    #[test]
    fn test_serialized_shape() {
        let detected = PatternMatch {
            pattern: ValuePattern::NumericRange { min: 1.0, max: 2.0 },
            confidence: 0.6,
        };
        let json = serde_json::to_value(&detected).unwrap();
        assert_eq!(json["pattern"]["kind"], "numericRange");
        assert_eq!(json["pattern"]["min"], 1.0);
    }
}
