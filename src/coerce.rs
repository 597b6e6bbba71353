//! Ready-made coercions. Each one is structural: [`validate`][crate::validate]
//! applies it as well as [`safe_parse`][crate::safe_parse].

use crate::schema::{self, Schema};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Number, Value};

/// Accepts an RFC 3339 timestamp or a `YYYY-MM-DD` date and yields the
/// instant as an RFC 3339 string in UTC.
pub fn timestamp() -> Schema {
    Schema::from(schema::string()).coerce("timestamp", |value| match value.as_str() {
        Some(s) => parse_timestamp(s)
            .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .ok_or_else(|| format!("\"{}\" is not a valid date", s)),
        None => Err("expected a string".to_owned()),
    })
}

/// Accepts a number, or a string holding one.
pub fn number() -> Schema {
    schema::union(vec![Schema::from(schema::number()), Schema::from(schema::string())]).coerce(
        "number",
        |value| match value {
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("\"{}\" is not a number", s)),
            other => Ok(other),
        },
    )
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|t| DateTime::from_naive_utc_and_offset(t, Utc))
}
