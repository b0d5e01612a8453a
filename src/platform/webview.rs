use anyhow::{Context, Result};
use tauri::{AppHandle, Emitter};
use tokio::sync::watch;

use crate::geofence::GeofenceState;

use super::{BridgeRequest, BridgeSink};

pub const PLATFORM_REQUEST_EVENT: &str = "platform-request";
pub const GEOFENCE_STATE_EVENT: &str = "geofence-state-changed";

/// Sends platform requests to the webview, which answers through the
/// `resolve_platform_request` command.
pub struct WebviewSink {
    app_handle: AppHandle,
}

impl WebviewSink {
    pub fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }
}

impl BridgeSink for WebviewSink {
    fn dispatch(&self, request: &BridgeRequest) -> Result<()> {
        self.app_handle
            .emit(PLATFORM_REQUEST_EVENT, request)
            .context("failed to emit platform request")
    }
}

/// Re-emits every evaluator state change until the evaluator goes away.
pub fn forward_geofence_states(app_handle: AppHandle, mut updates: watch::Receiver<GeofenceState>) {
    tauri::async_runtime::spawn(async move {
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if let Err(err) = app_handle.emit(GEOFENCE_STATE_EVENT, &state) {
                log::warn!("failed to emit geofence state: {err}");
            }
        }
    });
}
