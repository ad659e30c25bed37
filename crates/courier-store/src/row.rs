//! Row-mapping helpers shared by the repositories.
//!
//! Stored enum values and timestamps are TEXT; these helpers convert them
//! back to domain types, reporting corrupt values as conversion failures
//! rather than panicking.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;

/// Parse a stored enum value with the given `from_sql` parser.
pub(crate) fn parse_enum<T>(
    idx: usize,
    raw: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unrecognized stored value: {raw}").into(),
        )
    })
}

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                format!("bad timestamp {raw}: {e}").into(),
            )
        })
}

/// Parse an optional RFC 3339 timestamp column.
pub(crate) fn parse_timestamp_opt(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(idx, &s)).transpose()
}

/// Parse a JSON string-array column (agent allow-lists).
pub(crate) fn parse_string_array(idx: usize, raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("bad JSON array: {e}").into(),
        )
    })
}

/// Current time in the stored RFC 3339 form.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
