use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    geo::{distance, Coordinate},
    models::LocationSample,
};

use super::GeofenceVerdict;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("geofence radius must be a positive number of meters, got {0}")]
pub struct GeofenceConfigError(pub f64);

/// The site a check-in must happen at. One per process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawGeofenceConfig")]
pub struct GeofenceConfig {
    target: Coordinate,
    radius_meters: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGeofenceConfig {
    target: Coordinate,
    radius_meters: f64,
}

impl TryFrom<RawGeofenceConfig> for GeofenceConfig {
    type Error = GeofenceConfigError;

    fn try_from(raw: RawGeofenceConfig) -> Result<Self, Self::Error> {
        GeofenceConfig::new(raw.target, raw.radius_meters)
    }
}

pub const DEFAULT_RADIUS_METERS: f64 = 500.0;

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            target: Coordinate::literal(-7.4503, 110.221),
            radius_meters: DEFAULT_RADIUS_METERS,
        }
    }
}

impl GeofenceConfig {
    pub fn new(target: Coordinate, radius_meters: f64) -> Result<Self, GeofenceConfigError> {
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(GeofenceConfigError(radius_meters));
        }
        Ok(Self {
            target,
            radius_meters,
        })
    }

    pub fn target(&self) -> Coordinate {
        self.target
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    /// Measures `sample` against the site. The boundary itself counts as
    /// inside.
    pub fn evaluate(&self, sample: LocationSample) -> GeofenceVerdict {
        let distance_meters = distance(&sample.coordinate, &self.target);
        GeofenceVerdict {
            within_range: distance_meters <= self.radius_meters,
            distance_meters,
            sample,
        }
    }
}
