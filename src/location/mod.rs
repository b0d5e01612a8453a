use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::{
    models::LocationSample,
    platform::{Accuracy, LocationService, PermissionStatus, PositionError},
};

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location request timed out")]
    Timeout,
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

impl From<PositionError> for LocationError {
    fn from(err: PositionError) -> Self {
        match err {
            PositionError::Timeout => LocationError::Timeout,
            PositionError::Unavailable(reason) => LocationError::Unavailable(reason),
        }
    }
}

/// Turns the platform's permission prompt and position fix into one
/// [`LocationSample`]. Retries are the caller's business.
#[derive(Clone)]
pub struct LocationAcquirer {
    service: Arc<dyn LocationService>,
    accuracy: Accuracy,
}

impl LocationAcquirer {
    pub fn new(service: Arc<dyn LocationService>) -> Self {
        Self {
            service,
            accuracy: Accuracy::High,
        }
    }

    pub async fn acquire(&self) -> Result<LocationSample, LocationError> {
        if self.service.request_permission().await == PermissionStatus::Denied {
            return Err(LocationError::PermissionDenied);
        }

        let coordinate = self.service.current_position(self.accuracy).await?;
        Ok(LocationSample::new(coordinate, Utc::now()))
    }
}
