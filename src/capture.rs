use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use anyhow::{bail, Context};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::{
    models::PhotoHandle,
    platform::{CameraFacing, CameraOptions, CameraService, PermissionStatus},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("a capture is already in progress")]
    CaptureInProgress,
    #[error("failed to capture photo: {0}")]
    Failed(String),
}

/// Clears the in-flight flag however the capture ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CaptureStage {
    camera: Arc<dyn CameraService>,
    quality: f32,
    facing: Mutex<CameraFacing>,
    in_flight: AtomicBool,
}

impl CaptureStage {
    pub fn new(camera: Arc<dyn CameraService>, quality: f32, facing: CameraFacing) -> Self {
        Self {
            camera,
            quality: quality.clamp(0.0, 1.0),
            facing: Mutex::new(facing),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn facing(&self) -> CameraFacing {
        *self.facing_guard()
    }

    pub fn toggle_facing(&self) -> CameraFacing {
        let mut facing = self.facing_guard();
        *facing = facing.flipped();
        *facing
    }

    pub fn is_capturing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Takes one photo. A second call while the first is still running is
    /// turned away with [`CaptureError::CaptureInProgress`], never queued.
    pub async fn capture(&self) -> Result<PhotoHandle, CaptureError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log_info!("capture in progress, dropping duplicate shutter request");
            return Err(CaptureError::CaptureInProgress);
        }
        let _in_flight = InFlight(&self.in_flight);

        if self.camera.request_permission().await == PermissionStatus::Denied {
            return Err(CaptureError::PermissionDenied);
        }

        let options = CameraOptions {
            quality: self.quality,
            facing: self.facing(),
        };
        let image = self
            .camera
            .take_picture(options)
            .await
            .map_err(|fault| CaptureError::Failed(fault.0))?;
        let taken_at = Utc::now();

        let uri = image.uri;
        let probe_target = uri.clone();
        let dimensions = tokio::task::spawn_blocking(move || probe_photo(&probe_target))
            .await
            .map_err(|err| CaptureError::Failed(format!("photo probe join failed: {err}")))?
            .map_err(|err| {
                log_warn!("rejecting captured photo {}: {err:#}", uri.display());
                CaptureError::Failed(format!("{err:#}"))
            })?;

        log_info!(
            "captured {} ({:?})",
            uri.display(),
            dimensions.map(|(w, h)| format!("{w}x{h}"))
        );
        Ok(PhotoHandle::new(uri, taken_at, dimensions))
    }

    fn facing_guard(&self) -> MutexGuard<'_, CameraFacing> {
        match self.facing.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The file must exist and hold bytes. Dimensions are best effort: formats
/// the decoder does not know still upload.
fn probe_photo(path: &Path) -> anyhow::Result<Option<(u32, u32)>> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("photo {} is not readable", path.display()))?;
    if metadata.len() == 0 {
        bail!("photo {} is empty", path.display());
    }
    Ok(image::image_dimensions(path).ok())
}
