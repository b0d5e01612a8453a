use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

use crate::{geo::Coordinate, models::AttendanceStatus};

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| format!("failed to parse {field}"))
}

pub fn parse_status(value: &str) -> Result<AttendanceStatus> {
    match value {
        "present" => Ok(AttendanceStatus::Present),
        "absent" => Ok(AttendanceStatus::Absent),
        other => Err(anyhow!("unknown attendance status {other}")),
    }
}

pub fn parse_coordinate(latitude: f64, longitude: f64) -> Result<Coordinate> {
    Coordinate::new(latitude, longitude).context("stored coordinate out of range")
}
