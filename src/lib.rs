pub mod absence;
pub mod backend;
pub mod capture;
#[cfg(feature = "app")]
mod commands;
pub mod db;
pub mod geo;
pub mod geofence;
pub mod handoff;
pub mod location;
pub mod models;
pub mod pipeline;
pub mod platform;
pub mod settings;
pub mod submission;
pub mod utils;

pub use absence::{AbsenceError, AbsenceReportInput};
pub use backend::{AttendanceBackend, AuthError, BackendError, LocalBackend, SessionStore};
pub use capture::{CaptureError, CaptureStage};
pub use db::Database;
pub use geo::{distance, Coordinate};
pub use geofence::{GeofenceConfig, GeofenceEvaluator, GeofenceState, GeofenceVerdict};
pub use handoff::{AttendanceContext, HandoffError};
pub use location::{LocationAcquirer, LocationError};
pub use pipeline::{AttendancePipeline, PipelineError, PipelineSnapshot, PipelineStage};
pub use settings::{PipelineSettings, SettingsStore, SettingsUpdate};
pub use submission::{SubmissionError, SubmissionOrchestrator};

#[cfg(feature = "app")]
use std::sync::Arc;

#[cfg(feature = "app")]
use tauri::Manager;

#[cfg(feature = "app")]
pub(crate) struct AppState {
    pub(crate) settings: SettingsStore,
    pub(crate) backend: Arc<LocalBackend>,
    /// `None` when the platform services are simulated.
    pub(crate) bridge: Option<Arc<platform::PlatformBridge>>,
    pub(crate) pipeline: AttendancePipeline,
}

#[cfg(feature = "app")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use platform::{
        webview::{forward_geofence_states, WebviewSink},
        CameraService, LocationService, PlatformBridge, SimulatedCamera, SimulatedLocation,
    };

    // Reads RUST_LOG, defaults to info.
    utils::logging::init_logging();

    log::info!("GeoAttend starting up...");

    tauri::Builder::default()
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let settings = SettingsStore::new(app_data_dir.join("settings.json"))?;
                let pipeline_settings = settings.pipeline();

                let database = Database::new(app_data_dir.join("geoattend.sqlite3"))?;
                let backend = Arc::new(LocalBackend::new(
                    database,
                    app_data_dir.join("attendance-photos"),
                    Arc::new(SessionStore::new()),
                )?);

                let (location, camera, bridge): (
                    Arc<dyn LocationService>,
                    Arc<dyn CameraService>,
                    Option<Arc<PlatformBridge>>,
                ) = if pipeline_settings.simulate {
                    log::warn!("Using simulated location and camera");
                    let captures_dir = app
                        .path()
                        .app_cache_dir()
                        .map_err(|err| anyhow::anyhow!(err))?
                        .join("captures");
                    (
                        Arc::new(SimulatedLocation::new(pipeline_settings.simulated_position())),
                        Arc::new(SimulatedCamera::new(captures_dir)),
                        None,
                    )
                } else {
                    let bridge = Arc::new(PlatformBridge::new(
                        Arc::new(WebviewSink::new(app.handle().clone())),
                        pipeline_settings.bridge_timeout(),
                    ));
                    (bridge.clone(), bridge.clone(), Some(bridge))
                };

                let pipeline =
                    AttendancePipeline::new(&pipeline_settings, backend.clone(), location, camera)?;
                forward_geofence_states(app.handle().clone(), pipeline.subscribe());

                app.manage(AppState {
                    settings,
                    backend,
                    bridge,
                    pipeline,
                });

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            commands::start_attendance_check,
            commands::retry_location,
            commands::get_attendance_state,
            commands::confirm_attendance,
            commands::capture_attendance_photo,
            commands::toggle_camera_facing,
            commands::submit_attendance,
            commands::leave_attendance_check,
            commands::get_attendance_history,
            commands::submit_absence_report,
            commands::set_current_user,
            commands::sign_out,
            commands::resolve_platform_request,
            commands::get_pipeline_settings,
            commands::set_pipeline_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
