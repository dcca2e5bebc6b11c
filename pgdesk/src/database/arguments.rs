//! Raw-query arguments
//!
//! PostgreSQL infers a type for every `$n` placeholder when a statement is
//! prepared. Client values arrive as JSON, mostly as strings, and are converted
//! to the inferred type before binding so that `"2020-01-01"` compares against
//! a `timestamptz` and `"5"` against an `integer`.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use uuid::Uuid;

use crate::database::traits::DatabaseError;

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A parameter value in the type the server expects for its placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Bool(Option<bool>),
    Int2(Option<i16>),
    Int4(Option<i32>),
    Int8(Option<i64>),
    Float4(Option<f32>),
    Float8(Option<f64>),
    Numeric(Option<Decimal>),
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Date(Option<NaiveDate>),
    Time(Option<NaiveTime>),
    Timestamp(Option<NaiveDateTime>),
    TimestampTz(Option<DateTime<Utc>>),
    Json(Option<Value>),
    /// No conversion for the inferred type; bound by the JSON value's own type
    Untyped(Value),
}

impl Argument {
    /// Convert `value` for placeholder `$position`, whose inferred type is `type_name`
    ///
    /// `type_name` is the sqlx type name (`INT4`, `TIMESTAMPTZ`, ...). JSON
    /// `null` becomes a NULL of that type.
    pub fn coerce(position: usize, value: &Value, type_name: Option<&str>) -> Result<Self, DatabaseError> {
        let Some(type_name) = type_name else {
            return Ok(Argument::Untyped(value.clone()));
        };
        let invalid = || {
            DatabaseError::InvalidRequest(format!(
                "parameter ${} is not a valid {}: {}",
                position,
                type_name.to_lowercase(),
                value
            ))
        };

        let argument = match type_name {
            "BOOL" => Argument::Bool(convert(value, boolean).ok_or_else(invalid)?),
            "INT2" => Argument::Int2(
                convert(value, |value| integer(value).and_then(|integer| i16::try_from(integer).ok()))
                    .ok_or_else(invalid)?,
            ),
            "INT4" => Argument::Int4(
                convert(value, |value| integer(value).and_then(|integer| i32::try_from(integer).ok()))
                    .ok_or_else(invalid)?,
            ),
            "INT8" => Argument::Int8(convert(value, integer).ok_or_else(invalid)?),
            "FLOAT4" => Argument::Float4(
                convert(value, |value| float(value).map(|float| float as f32)).ok_or_else(invalid)?,
            ),
            "FLOAT8" => Argument::Float8(convert(value, float).ok_or_else(invalid)?),
            "NUMERIC" => Argument::Numeric(convert(value, decimal).ok_or_else(invalid)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                Argument::Text(convert(value, |value| Some(text(value))).ok_or_else(invalid)?)
            }
            "UUID" => Argument::Uuid(
                convert(value, |value| value.as_str().and_then(|text| Uuid::parse_str(text.trim()).ok()))
                    .ok_or_else(invalid)?,
            ),
            "DATE" => Argument::Date(convert(value, |value| value.as_str().and_then(parse_date)).ok_or_else(invalid)?),
            "TIME" => Argument::Time(convert(value, |value| value.as_str().and_then(parse_time)).ok_or_else(invalid)?),
            "TIMESTAMP" => Argument::Timestamp(
                convert(value, |value| value.as_str().and_then(parse_timestamp)).ok_or_else(invalid)?,
            ),
            "TIMESTAMPTZ" => Argument::TimestampTz(
                convert(value, |value| value.as_str().and_then(parse_timestamp_tz)).ok_or_else(invalid)?,
            ),
            "JSON" | "JSONB" => Argument::Json(convert(value, |value| Some(value.clone())).ok_or_else(invalid)?),
            _ => Argument::Untyped(value.clone()),
        };
        Ok(argument)
    }
}

/// Bind `argument` as the next placeholder of `statement`
pub fn bind(statement: Query<'_, Postgres, PgArguments>, argument: Argument) -> Query<'_, Postgres, PgArguments> {
    match argument {
        Argument::Bool(value) => statement.bind(value),
        Argument::Int2(value) => statement.bind(value),
        Argument::Int4(value) => statement.bind(value),
        Argument::Int8(value) => statement.bind(value),
        Argument::Float4(value) => statement.bind(value),
        Argument::Float8(value) => statement.bind(value),
        Argument::Numeric(value) => statement.bind(value),
        Argument::Text(value) => statement.bind(value),
        Argument::Uuid(value) => statement.bind(value),
        Argument::Date(value) => statement.bind(value),
        Argument::Time(value) => statement.bind(value),
        Argument::Timestamp(value) => statement.bind(value),
        Argument::TimestampTz(value) => statement.bind(value),
        Argument::Json(value) => statement.bind(value.map(sqlx::types::Json)),
        Argument::Untyped(value) => match value {
            Value::Null => statement.bind(Option::<String>::None),
            Value::Bool(flag) => statement.bind(flag),
            Value::Number(number) => match number.as_i64() {
                Some(integer) => statement.bind(integer),
                None => statement.bind(number.as_f64()),
            },
            Value::String(text) => statement.bind(text),
            other => statement.bind(sqlx::types::Json(other)),
        },
    }
}

/// `Some(None)` for null, `Some(Some(_))` when `parse` accepts the value, `None` otherwise
fn convert<T>(value: &Value, parse: impl FnOnce(&Value) -> Option<T>) -> Option<Option<T>> {
    if value.is_null() {
        return Some(None);
    }
    parse(value).map(Some)
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
            "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(text).map(|timestamp| timestamp.date()))
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|timestamp| timestamp.naive_local()))
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Timestamps without an offset are taken as UTC
fn parse_timestamp_tz(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .ok()
        .or_else(|| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z").ok())
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .or_else(|| parse_timestamp(text).map(|timestamp| timestamp.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_strings_take_the_inferred_type() {
        assert_eq!(
            Argument::coerce(1, &json!("2020-01-01"), Some("TIMESTAMPTZ")).unwrap(),
            Argument::TimestampTz(Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()))
        );
        assert_eq!(
            Argument::coerce(1, &json!("5"), Some("INT4")).unwrap(),
            Argument::Int4(Some(5))
        );
        assert_eq!(
            Argument::coerce(2, &json!(" 42 "), Some("INT8")).unwrap(),
            Argument::Int8(Some(42))
        );
        assert_eq!(
            Argument::coerce(1, &json!("yes"), Some("BOOL")).unwrap(),
            Argument::Bool(Some(true))
        );
        assert_eq!(
            Argument::coerce(1, &json!("12.50"), Some("NUMERIC")).unwrap(),
            Argument::Numeric(Some(Decimal::new(1250, 2)))
        );
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 0).unwrap();
        for text in [
            "2024-03-09T08:30:00Z",
            "2024-03-09T10:30:00+02:00",
            "2024-03-09 08:30:00",
            "2024-03-09 08:30",
            "2024-03-09 10:30:00+02",
        ] {
            assert_eq!(
                Argument::coerce(1, &json!(text), Some("TIMESTAMPTZ")).unwrap(),
                Argument::TimestampTz(Some(expected)),
                "{}",
                text
            );
        }

        assert_eq!(
            Argument::coerce(1, &json!("2024-03-09T08:30:00.250"), Some("TIMESTAMP")).unwrap(),
            Argument::Timestamp(NaiveDate::from_ymd_opt(2024, 3, 9).and_then(|date| date.and_hms_milli_opt(8, 30, 0, 250)))
        );
        assert_eq!(
            Argument::coerce(1, &json!("2024-03-09T08:30:00Z"), Some("DATE")).unwrap(),
            Argument::Date(NaiveDate::from_ymd_opt(2024, 3, 9))
        );
        assert_eq!(
            Argument::coerce(1, &json!("08:30"), Some("TIME")).unwrap(),
            Argument::Time(NaiveTime::from_hms_opt(8, 30, 0))
        );
    }

    #[test]
    fn test_null_is_typed() {
        assert_eq!(Argument::coerce(1, &Value::Null, Some("INT4")).unwrap(), Argument::Int4(None));
        assert_eq!(
            Argument::coerce(1, &Value::Null, Some("TIMESTAMPTZ")).unwrap(),
            Argument::TimestampTz(None)
        );
    }

    #[test]
    fn test_numbers_and_flags_become_text_for_text_placeholders() {
        assert_eq!(
            Argument::coerce(1, &json!(7), Some("TEXT")).unwrap(),
            Argument::Text(Some("7".to_string()))
        );
        assert_eq!(
            Argument::coerce(1, &json!(true), Some("VARCHAR")).unwrap(),
            Argument::Text(Some("true".to_string()))
        );
    }

    #[test]
    fn test_unconvertible_values_are_rejected() {
        let error = Argument::coerce(3, &json!("abc"), Some("INT4")).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid request: parameter $3 is not a valid int4: \"abc\""
        );
        assert!(Argument::coerce(1, &json!(70000), Some("INT2")).is_err());
        assert!(Argument::coerce(1, &json!("soon"), Some("DATE")).is_err());
        assert!(Argument::coerce(1, &json!("not-a-uuid"), Some("UUID")).is_err());
    }

    #[test]
    fn test_unknown_types_keep_the_json_value() {
        assert_eq!(
            Argument::coerce(1, &json!("happy"), Some("mood")).unwrap(),
            Argument::Untyped(json!("happy"))
        );
        assert_eq!(Argument::coerce(1, &json!(1), None).unwrap(), Argument::Untyped(json!(1)));
    }
}
