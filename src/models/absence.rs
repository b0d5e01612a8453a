use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::AttendanceStatus;

/// A manually filed attendance report (no geofence, no photo).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceReport {
    pub user_id: String,
    pub full_name: String,
    pub date: NaiveDate,
    pub reason: String,
    pub class_name: String,
    pub status: AttendanceStatus,
}
