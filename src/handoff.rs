//! The commit point between watching the location and acting on it.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::{geo::Coordinate, geofence::GeofenceVerdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum HandoffError {
    #[error("location has not been verified inside the attendance area")]
    NotVerified,
    #[error("no signed-in user to attribute the attendance to")]
    MissingIdentity,
}

/// Who checked in, where, and when, as observed at the moment of
/// confirmation.
///
/// Not `Clone` and not `Deserialize`: a context is made once, by [`confirm`],
/// and moves into the submission that consumes it.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceContext {
    user_id: String,
    coordinate: Coordinate,
    captured_at: DateTime<Utc>,
}

impl AttendanceContext {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.captured_at)
    }
}

/// Freezes `verdict` into an [`AttendanceContext`] for `user_id`.
///
/// Callers go through `GeofenceEvaluator::confirm`, which also stops polling.
pub(crate) fn confirm(
    verdict: &GeofenceVerdict,
    user_id: Option<&str>,
) -> Result<AttendanceContext, HandoffError> {
    if !verdict.within_range {
        return Err(HandoffError::NotVerified);
    }

    let user_id = user_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(HandoffError::MissingIdentity)?;

    Ok(AttendanceContext {
        user_id: user_id.to_string(),
        coordinate: verdict.sample.coordinate,
        captured_at: verdict.sample.sampled_at,
    })
}
