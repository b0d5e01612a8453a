use chrono::Utc;
use tauri::State;
use uuid::Uuid;

use crate::{
    absence::{submit_absence_report as file_absence_report, AbsenceReportInput},
    geofence::GeofenceState,
    models::{AttendanceRecord, Identity, RecordId},
    pipeline::{ContextView, PhotoView, PipelineError, PipelineSnapshot},
    platform::{BridgeReply, CameraFacing},
    settings::{PipelineSettings, SettingsUpdate},
};

use crate::AppState;

fn user_facing(err: PipelineError) -> String {
    log::warn!("attendance pipeline: {err}");
    err.user_message().to_string()
}

#[tauri::command]
pub async fn start_attendance_check(state: State<'_, AppState>) -> Result<GeofenceState, String> {
    state.pipeline.enter().await.map_err(user_facing)
}

#[tauri::command]
pub async fn retry_location(state: State<'_, AppState>) -> Result<GeofenceState, String> {
    Ok(state.pipeline.retry_location().await)
}

#[tauri::command]
pub async fn get_attendance_state(state: State<'_, AppState>) -> Result<PipelineSnapshot, String> {
    Ok(state.pipeline.snapshot().await)
}

#[tauri::command]
pub async fn confirm_attendance(state: State<'_, AppState>) -> Result<ContextView, String> {
    state.pipeline.proceed().await.map_err(user_facing)
}

#[tauri::command]
pub async fn capture_attendance_photo(state: State<'_, AppState>) -> Result<PhotoView, String> {
    state.pipeline.capture().await.map_err(user_facing)
}

#[tauri::command]
pub async fn toggle_camera_facing(state: State<'_, AppState>) -> Result<CameraFacing, String> {
    Ok(state.pipeline.toggle_facing())
}

#[tauri::command]
pub async fn submit_attendance(state: State<'_, AppState>) -> Result<AttendanceRecord, String> {
    state.pipeline.submit().await.map_err(user_facing)
}

#[tauri::command]
pub async fn leave_attendance_check(state: State<'_, AppState>) -> Result<(), String> {
    state.pipeline.leave().await.map_err(user_facing)
}

#[tauri::command]
pub async fn get_attendance_history(
    state: State<'_, AppState>,
    limit: Option<u32>,
) -> Result<Vec<AttendanceRecord>, String> {
    let user = state
        .backend
        .session()
        .current()
        .ok_or_else(|| "Failed to retrieve user. Please log in again.".to_string())?;
    state
        .backend
        .db()
        .list_attendance_for_user(&user.id, limit.unwrap_or(30))
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn submit_absence_report(
    state: State<'_, AppState>,
    report: AbsenceReportInput,
) -> Result<RecordId, String> {
    let offset = state.settings.pipeline().utc_offset().map_err(|e| e.to_string())?;
    let today = Utc::now().with_timezone(&offset).date_naive();
    let (id, _) = file_absence_report(state.backend.as_ref(), report, today)
        .await
        .map_err(|e| e.to_string())?;
    Ok(id)
}

#[tauri::command]
pub async fn set_current_user(state: State<'_, AppState>, user: Identity) -> Result<(), String> {
    log::info!("signed in as {}", user.id);
    state.backend.session().set_user(user);
    Ok(())
}

#[tauri::command]
pub async fn sign_out(state: State<'_, AppState>) -> Result<(), String> {
    state.pipeline.leave().await.map_err(user_facing)?;
    state.backend.session().clear();
    Ok(())
}

#[tauri::command]
pub async fn resolve_platform_request(
    state: State<'_, AppState>,
    id: Uuid,
    reply: BridgeReply,
) -> Result<(), String> {
    let bridge = state
        .bridge
        .as_ref()
        .ok_or_else(|| "platform bridge is disabled in simulation mode".to_string())?;
    bridge.resolve(id, reply).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_pipeline_settings(state: State<AppState>) -> Result<PipelineSettings, String> {
    Ok(state.settings.pipeline())
}

/// Saves the settings. The running pipeline keeps the ones it started with,
/// so the reply says whether a restart is needed to apply them.
#[tauri::command]
pub fn set_pipeline_settings(
    settings: PipelineSettings,
    state: State<AppState>,
) -> Result<SettingsUpdate, String> {
    let update = state
        .settings
        .update_pipeline(settings)
        .map_err(|e| e.to_string())?;
    if update.restart_required {
        log::info!("pipeline settings saved; they apply after a restart");
    }
    Ok(update)
}
