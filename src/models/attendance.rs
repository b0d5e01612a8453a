//! Attendance record data model.
//!
//! A record is built by the submission orchestrator from a frozen
//! `AttendanceContext` and the uploaded photo address, then handed to the
//! backend for a single insert.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

pub type RecordId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    /// Assigned by the backend on insert.
    pub id: Option<RecordId>,
    pub user_id: String,
    pub date: NaiveDate,
    pub coordinate: Coordinate,
    pub photo_reference: String,
    pub status: AttendanceStatus,
    pub checked_in_at: DateTime<Utc>,
}
