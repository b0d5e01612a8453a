use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
}

/// A WGS84 position in decimal degrees.
///
/// Fields are private so every value in circulation has passed the range
/// check in [`Coordinate::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        // NaN fails both range checks.
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// For literals only; anything read at runtime goes through
    /// [`Coordinate::new`].
    pub(crate) const fn literal(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawCoordinate::deserialize(deserializer)?;
        Coordinate::new(raw.latitude, raw.longitude).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bounds() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        assert_eq!(
            Coordinate::new(90.5, 0.0),
            Err(CoordinateError::Latitude(90.5))
        );
        assert_eq!(
            Coordinate::new(0.0, -180.1),
            Err(CoordinateError::Longitude(-180.1))
        );
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn deserialization_validates_range() {
        let ok: Coordinate =
            serde_json::from_str(r#"{"latitude": -7.4503, "longitude": 110.221}"#).unwrap();
        assert_eq!(ok.latitude(), -7.4503);

        let bad = serde_json::from_str::<Coordinate>(r#"{"latitude": 123.0, "longitude": 0.0}"#);
        assert!(bad.is_err());
    }
}
