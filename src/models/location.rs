use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// One position fix. A re-sample produces a new value; samples are never
/// updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub coordinate: Coordinate,
    pub sampled_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(coordinate: Coordinate, sampled_at: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            sampled_at,
        }
    }
}
