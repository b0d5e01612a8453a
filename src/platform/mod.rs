//! Seams to the device: location fixes and the camera.
//!
//! The pipeline only talks to these traits. `bridge` forwards the calls to
//! the hosting webview; `simulated` answers them in-process for desktop
//! development and tests.

pub mod bridge;
pub mod simulated;
#[cfg(feature = "app")]
pub mod webview;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::Coordinate;

pub use bridge::{BridgeReply, BridgeRequest, BridgeSink, PlatformBridge, RequestKind};
pub use simulated::{SimulatedCamera, SimulatedLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Accuracy {
    High,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("location request timed out")]
    Timeout,
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LocationService: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;
    async fn current_position(&self, accuracy: Accuracy) -> Result<Coordinate, PositionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

impl CameraFacing {
    pub fn flipped(self) -> Self {
        match self {
            CameraFacing::Back => CameraFacing::Front,
            CameraFacing::Front => CameraFacing::Back,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraOptions {
    /// JPEG quality in `0.0..=1.0`.
    pub quality: f32,
    pub facing: CameraFacing,
}

/// What the camera hands back: a file on local storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedImage {
    pub uri: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("camera failure: {0}")]
pub struct CameraFault(pub String);

#[async_trait]
pub trait CameraService: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;
    async fn take_picture(&self, options: CameraOptions) -> Result<CapturedImage, CameraFault>;
}
