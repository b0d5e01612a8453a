//! Manual attendance reports: no geofence, no photo, just the form.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    backend::{AttendanceBackend, AuthError, BackendError},
    models::{AbsenceReport, AttendanceStatus, RecordId},
};

pub const MAX_FULL_NAME_CHARS: usize = 32;
const UNKNOWN_FULL_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum AbsenceError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("failed to retrieve user information: {0}")]
    Unauthenticated(String),
    #[error("failed to report attendance: {0}")]
    Backend(String),
}

impl From<AuthError> for AbsenceError {
    fn from(err: AuthError) -> Self {
        AbsenceError::Unauthenticated(err.to_string())
    }
}

impl From<BackendError> for AbsenceError {
    fn from(err: BackendError) -> Self {
        AbsenceError::Backend(err.to_string())
    }
}

/// What the form sends. Missing date means today; missing status means
/// absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceReportInput {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub status: Option<AttendanceStatus>,
}

impl AbsenceReportInput {
    /// Builds the report for `user_id`, trimming fields and capping the name.
    pub fn into_report(self, user_id: &str, today: NaiveDate) -> Result<AbsenceReport, AbsenceError> {
        let reason = self.reason.trim();
        if reason.is_empty() {
            return Err(AbsenceError::MissingField("reason"));
        }
        let class_name = self.class_name.trim();
        if class_name.is_empty() {
            return Err(AbsenceError::MissingField("class name"));
        }

        let full_name = self
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| name.chars().take(MAX_FULL_NAME_CHARS).collect())
            .unwrap_or_else(|| UNKNOWN_FULL_NAME.to_string());

        Ok(AbsenceReport {
            user_id: user_id.to_string(),
            full_name,
            date: self.date.unwrap_or(today),
            reason: reason.to_string(),
            class_name: class_name.to_string(),
            status: self.status.unwrap_or(AttendanceStatus::Absent),
        })
    }
}

/// Files a report for whoever is signed in.
pub async fn submit_absence_report(
    backend: &dyn AttendanceBackend,
    input: AbsenceReportInput,
    today: NaiveDate,
) -> Result<(RecordId, AbsenceReport), AbsenceError> {
    let user = backend.current_user().await?;
    let report = input.into_report(&user.id, today)?;
    let id = backend.insert_absence_report(&report).await?;
    log::info!("absence report {id} filed for {} on {}", report.user_id, report.date);
    Ok((id, report))
}
