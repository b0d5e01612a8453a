use anyhow::{ensure, Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::{geo::Coordinate, geofence::GeofenceConfig, platform::CameraFacing};

/// Set to `1` to poll every few seconds while testing on a device.
pub const DEBUG_ENV_VAR: &str = "GEOATTEND_DEBUG";
const DEBUG_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    pub geofence: GeofenceConfig,
    pub poll_interval_secs: u64,
    /// JPEG quality in `0.0..=1.0`.
    pub capture_quality: f32,
    pub camera_facing: CameraFacing,
    pub bridge_timeout_secs: u64,
    /// Offset used to turn a check-in instant into the attendance date.
    pub utc_offset_minutes: i32,
    /// How long a confirmed location may sit before the photo is taken.
    pub context_max_age_secs: u64,
    /// Use the in-process location and camera instead of the webview.
    pub simulate: bool,
    pub simulated_position: Option<Coordinate>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            geofence: GeofenceConfig::default(),
            poll_interval_secs: 20,
            capture_quality: 0.7,
            camera_facing: CameraFacing::Back,
            bridge_timeout_secs: 30,
            utc_offset_minutes: 7 * 60,
            context_max_age_secs: 300,
            simulate: false,
            simulated_position: None,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.poll_interval_secs > 0, "poll interval must be at least one second");
        ensure!(
            (0.0..=1.0).contains(&self.capture_quality),
            "capture quality {} is outside 0.0..=1.0",
            self.capture_quality
        );
        ensure!(self.bridge_timeout_secs > 0, "bridge timeout must be at least one second");
        ensure!(self.context_max_age_secs > 0, "context max age must be at least one second");
        self.utc_offset()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge_timeout_secs)
    }

    pub fn context_max_age(&self) -> Duration {
        Duration::from_secs(self.context_max_age_secs)
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .with_context(|| format!("UTC offset of {} minutes is out of range", self.utc_offset_minutes))
    }

    /// Where the simulated location reports from; the site itself unless
    /// configured otherwise.
    pub fn simulated_position(&self) -> Coordinate {
        self.simulated_position.unwrap_or_else(|| self.geofence.target())
    }

    fn apply_env_overrides(&mut self, debug: Option<&str>) {
        if matches!(debug, Some("1") | Some("true")) {
            self.poll_interval_secs = DEBUG_POLL_INTERVAL_SECS;
        }
    }
}

/// Result of saving settings from the app.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub settings: PipelineSettings,
    /// The running pipeline was built from different settings and keeps
    /// them until the app restarts.
    pub restart_required: bool,
}

/// Settings file in the app data directory. A missing file means defaults;
/// a file that does not parse or validate is an error.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PipelineSettings>,
    /// What the pipeline was started with.
    launched: PipelineSettings,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = load(&path)?;
        data.apply_env_overrides(std::env::var(DEBUG_ENV_VAR).ok().as_deref());

        Ok(Self {
            path,
            launched: data.clone(),
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pipeline(&self) -> PipelineSettings {
        self.read().clone()
    }

    pub fn update_pipeline(&self, settings: PipelineSettings) -> Result<SettingsUpdate> {
        settings.validate()?;
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings.clone();
        Ok(SettingsUpdate {
            restart_required: settings != self.launched,
            settings,
        })
    }

    fn persist(&self, data: &PipelineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, PipelineSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, PipelineSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn load(path: &Path) -> Result<PipelineSettings> {
    if !path.exists() {
        return Ok(PipelineSettings::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let data: PipelineSettings = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    data.validate()
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let data = load(&dir.path().join("settings.json")).unwrap();

        assert_eq!(data, PipelineSettings::default());
        assert_eq!(data.poll_interval(), Duration::from_secs(20));
        assert_eq!(data.geofence.radius_meters(), 500.0);
        assert_eq!(data.utc_offset().unwrap().local_minus_utc(), 7 * 3600);
        assert_eq!(data.simulated_position(), data.geofence.target());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"pollIntervalSecs": 60, "simulate": true}"#).unwrap();

        let data = load(&path).unwrap();
        assert_eq!(data.poll_interval_secs, 60);
        assert!(data.simulate);
        assert_eq!(data.capture_quality, 0.7);
    }

    #[test]
    fn rejects_bad_geofence_and_quality() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        fs::write(
            &path,
            r#"{"geofence": {"target": {"latitude": 95.0, "longitude": 0.0}, "radiusMeters": 10}}"#,
        )
        .unwrap();
        assert!(load(&path).is_err());

        fs::write(&path, r#"{"captureQuality": 1.5}"#).unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn huge_utc_offset_is_an_error_not_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"utcOffsetMinutes": 2000000000}"#).unwrap();

        let err = load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("out of range"));

        let mut data = PipelineSettings::default();
        data.utc_offset_minutes = 25 * 60;
        assert!(data.validate().is_err());
    }

    #[test]
    fn debug_flag_shortens_polling() {
        let mut data = PipelineSettings::default();
        data.apply_env_overrides(Some("0"));
        assert_eq!(data.poll_interval_secs, 20);
        data.apply_env_overrides(Some("1"));
        assert_eq!(data.poll_interval(), Duration::from_secs(DEBUG_POLL_INTERVAL_SECS));
    }

    #[test]
    fn update_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut next = store.pipeline();
        next.camera_facing = CameraFacing::Front;
        next.context_max_age_secs = 120;
        let saved = store.update_pipeline(next.clone()).unwrap();
        assert!(saved.restart_required);
        assert_eq!(saved.settings, next);

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.pipeline().camera_facing, CameraFacing::Front);
        assert_eq!(reopened.pipeline().context_max_age_secs, 120);

        let mut invalid = next;
        invalid.poll_interval_secs = 0;
        assert!(store.update_pipeline(invalid).is_err());
        assert_eq!(store.pipeline().poll_interval_secs, reopened.pipeline().poll_interval_secs);
    }

    #[test]
    fn saving_launch_settings_needs_no_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();

        let mut changed = store.pipeline();
        changed.simulate = !changed.simulate;
        assert!(store.update_pipeline(changed).unwrap().restart_required);

        let saved = store.update_pipeline(store.launched.clone()).unwrap();
        assert!(!saved.restart_required);

        let json = serde_json::to_value(&saved).unwrap();
        assert_eq!(json["restartRequired"], false);
    }
}
