//! SQLite storage layer.
//!
//! Repository and job queue implementations backed by SQLite with WAL mode
//! and split read/write connection pools.

pub mod jobs;
pub mod pool;
pub mod workflow;

use chrono::{DateTime, SecondsFormat, Utc};
use stepwise_types::error::RepositoryError;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Shared column codecs
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    s.as_deref().map(parse_datetime).transpose()
}

/// Fixed-width UTC timestamps, so TEXT comparisons order correctly.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_json(s: Option<String>, what: &str) -> Result<Option<serde_json::Value>, RepositoryError> {
    s.as_deref()
        .map(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| RepositoryError::Query(format!("invalid {what} JSON: {e}")))
        })
        .transpose()
}

fn to_json(value: Option<&serde_json::Value>) -> Result<Option<String>, RepositoryError> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RepositoryError::Query(format!("serialize JSON: {e}")))
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

/// Map a UNIQUE violation to `Conflict`, anything else to `Query`.
fn write_error(e: sqlx::Error, conflict: impl FnOnce() -> String) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.message().contains("UNIQUE") {
            return RepositoryError::Conflict(conflict());
        }
    }
    query_error(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn datetime_format_is_fixed_width_and_round_trips() {
        let whole = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::microseconds(5);
        let a = format_datetime(&whole);
        let b = format_datetime(&fractional);
        assert_eq!(a, "2026-03-01T09:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_datetime(&b).unwrap(), fractional);
    }

    #[test]
    fn json_columns() {
        assert_eq!(parse_json(None, "input").unwrap(), None);
        assert_eq!(
            parse_json(Some("{\"a\":1}".into()), "input").unwrap(),
            Some(serde_json::json!({"a": 1}))
        );
        assert!(parse_json(Some("{oops".into()), "input").is_err());
    }
}
