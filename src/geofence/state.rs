use serde::Serialize;

use crate::{location::LocationError, models::LocationSample};

use super::{CheckTrigger, GeofenceConfig};

/// Outcome of one evaluation cycle. Re-derived on every check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceVerdict {
    pub within_range: bool,
    pub distance_meters: f64,
    pub sample: LocationSample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum GeofenceState {
    #[default]
    Idle,
    Checking,
    Verified {
        verdict: GeofenceVerdict,
    },
    /// `verdict` is `None` when no fix could be taken; the distance is then
    /// unknown and `failure` says why.
    OutOfRange {
        verdict: Option<GeofenceVerdict>,
        failure: Option<LocationError>,
    },
    PermissionBlocked,
}

impl GeofenceState {
    /// Maps one acquisition attempt to the next state. The prior state plays
    /// no part: a failed fix can only ever land outside the fence.
    pub fn from_acquisition(
        config: &GeofenceConfig,
        acquisition: Result<LocationSample, LocationError>,
    ) -> Self {
        match acquisition {
            Ok(sample) => {
                let verdict = config.evaluate(sample);
                if verdict.within_range {
                    GeofenceState::Verified { verdict }
                } else {
                    GeofenceState::OutOfRange {
                        verdict: Some(verdict),
                        failure: None,
                    }
                }
            }
            Err(LocationError::PermissionDenied) => GeofenceState::PermissionBlocked,
            Err(failure) => GeofenceState::OutOfRange {
                verdict: None,
                failure: Some(failure),
            },
        }
    }

    /// Whether a check started by `trigger` may leave this state. A blocked
    /// permission only clears on a user retry.
    pub fn accepts(&self, trigger: CheckTrigger) -> bool {
        !matches!(
            (self, trigger),
            (GeofenceState::PermissionBlocked, CheckTrigger::Timer)
        )
    }

    pub fn verdict(&self) -> Option<&GeofenceVerdict> {
        match self {
            GeofenceState::Verified { verdict } => Some(verdict),
            GeofenceState::OutOfRange { verdict, .. } => verdict.as_ref(),
            _ => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, GeofenceState::Verified { .. })
    }
}
