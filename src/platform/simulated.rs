//! In-process stand-ins for the device services.
//!
//! Used when the settings ask for simulation (desktop builds without GPS or a
//! camera) and by the tests.

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};
use uuid::Uuid;

use crate::geo::Coordinate;

use super::{
    Accuracy, CameraFacing, CameraFault, CameraOptions, CameraService, CapturedImage,
    LocationService, PermissionStatus, PositionError,
};

const FRAME_WIDTH: u32 = 320;
const FRAME_HEIGHT: u32 = 240;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Reports a fixed position that can be moved or broken at runtime.
pub struct SimulatedLocation {
    permission: Mutex<PermissionStatus>,
    fix: Mutex<Result<Coordinate, PositionError>>,
    fixes_requested: AtomicUsize,
}

impl SimulatedLocation {
    pub fn new(position: Coordinate) -> Self {
        Self {
            permission: Mutex::new(PermissionStatus::Granted),
            fix: Mutex::new(Ok(position)),
            fixes_requested: AtomicUsize::new(0),
        }
    }

    pub fn move_to(&self, position: Coordinate) {
        *lock(&self.fix) = Ok(position);
    }

    pub fn fail_with(&self, error: PositionError) {
        *lock(&self.fix) = Err(error);
    }

    pub fn set_permission(&self, status: PermissionStatus) {
        *lock(&self.permission) = status;
    }

    /// Number of position fixes served so far (permission prompts excluded).
    pub fn fixes_requested(&self) -> usize {
        self.fixes_requested.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationService for SimulatedLocation {
    async fn request_permission(&self) -> PermissionStatus {
        *lock(&self.permission)
    }

    async fn current_position(&self, _accuracy: Accuracy) -> Result<Coordinate, PositionError> {
        self.fixes_requested.fetch_add(1, Ordering::SeqCst);
        lock(&self.fix).clone()
    }
}

/// Writes a synthetic JPEG frame into `output_dir` for every shot.
pub struct SimulatedCamera {
    output_dir: PathBuf,
    permission: Mutex<PermissionStatus>,
    shots_taken: AtomicUsize,
}

impl SimulatedCamera {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            permission: Mutex::new(PermissionStatus::Granted),
            shots_taken: AtomicUsize::new(0),
        }
    }

    pub fn set_permission(&self, status: PermissionStatus) {
        *lock(&self.permission) = status;
    }

    pub fn shots_taken(&self) -> usize {
        self.shots_taken.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraService for SimulatedCamera {
    async fn request_permission(&self) -> PermissionStatus {
        *lock(&self.permission)
    }

    async fn take_picture(&self, options: CameraOptions) -> Result<CapturedImage, CameraFault> {
        let path = self.output_dir.join(format!("{}.jpg", Uuid::new_v4()));
        let target = path.clone();

        tokio::task::spawn_blocking(move || render_frame(&target, options))
            .await
            .map_err(|err| CameraFault(format!("frame worker join failed: {err}")))?
            .map_err(|err| CameraFault(format!("{err:#}")))?;

        self.shots_taken.fetch_add(1, Ordering::SeqCst);
        Ok(CapturedImage { uri: path })
    }
}

fn render_frame(path: &Path, options: CameraOptions) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let tint = match options.facing {
        CameraFacing::Back => [40u8, 90, 160],
        CameraFacing::Front => [160, 90, 40],
    };
    let frame = RgbImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
        let shade = ((x + y) % 256) as u8;
        Rgb([tint[0].wrapping_add(shade / 4), tint[1], tint[2].wrapping_add(shade / 8)])
    });

    let quality = (options.quality.clamp(0.01, 1.0) * 100.0).round() as u8;
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality);
    encoder
        .encode_image(&frame)
        .context("failed to encode simulated frame")?;
    Ok(())
}
