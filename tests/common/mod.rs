#![allow(dead_code)]

use std::sync::Arc;

use geoattend_lib::{
    models::Identity,
    platform::{SimulatedCamera, SimulatedLocation},
    AttendancePipeline, Coordinate, Database, GeofenceConfig, LocalBackend, PipelineSettings,
    SessionStore,
};
use tempfile::TempDir;

pub fn site() -> Coordinate {
    Coordinate::new(-7.4503, 110.221).unwrap()
}

/// About 2.2 km south of the site.
pub fn far_away() -> Coordinate {
    Coordinate::new(-7.4703, 110.221).unwrap()
}

pub struct App {
    pub dir: TempDir,
    pub backend: Arc<LocalBackend>,
    pub location: Arc<SimulatedLocation>,
    pub camera: Arc<SimulatedCamera>,
    pub pipeline: AttendancePipeline,
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        geofence: GeofenceConfig::new(site(), 500.0).unwrap(),
        simulate: true,
        ..PipelineSettings::default()
    }
}

pub fn app() -> App {
    app_with(settings())
}

pub fn app_with(settings: PipelineSettings) -> App {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("geoattend.sqlite3")).unwrap();
    let backend = Arc::new(
        LocalBackend::new(db, dir.path().join("photos"), Arc::new(SessionStore::new())).unwrap(),
    );
    let location = Arc::new(SimulatedLocation::new(settings.simulated_position()));
    let camera = Arc::new(SimulatedCamera::new(dir.path().join("captures")));
    let pipeline =
        AttendancePipeline::new(&settings, backend.clone(), location.clone(), camera.clone())
            .unwrap();

    App {
        dir,
        backend,
        location,
        camera,
        pipeline,
    }
}

pub fn sign_in(app: &App, id: &str) {
    app.backend.session().set_user(Identity {
        id: id.into(),
        email: Some(format!("{id}@sekolah.example")),
    });
}
