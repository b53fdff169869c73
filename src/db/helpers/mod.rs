use std::convert::TryFrom;

use anyhow::{anyhow, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::db::models::ComparisonStatus;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn opt_to_i64(value: Option<u64>) -> Result<Option<i64>> {
    value.map(to_i64).transpose()
}

pub fn opt_to_u64(value: Option<i64>, field: &str) -> Result<Option<u64>> {
    value.map(|raw| to_u64(raw, field)).transpose()
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_text() -> String {
    format_datetime(&Utc::now())
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn parse_status(value: &str) -> Result<ComparisonStatus> {
    match value {
        "new" => Ok(ComparisonStatus::New),
        "passed" => Ok(ComparisonStatus::Passed),
        "failed" => Ok(ComparisonStatus::Failed),
        "baseline-updated" => Ok(ComparisonStatus::BaselineUpdated),
        "accepted" => Ok(ComparisonStatus::Accepted),
        "rejected" => Ok(ComparisonStatus::Rejected),
        "error" => Ok(ComparisonStatus::Error),
        other => Err(anyhow!("unknown comparison status {other}")),
    }
}

/// Wrap a conversion failure so it can leave a `query_map` closure.
pub fn conversion_error(err: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{err:#}"),
        )),
    )
}
