//! One check-in screen: locate, confirm, photograph, submit.
//!
//! The stages below this module return typed errors and nothing else. This
//! is where they turn into the messages a user reads.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

use crate::{
    backend::{AttendanceBackend, AuthError},
    capture::{CaptureError, CaptureStage},
    geo::Coordinate,
    geofence::{GeofenceEvaluator, GeofenceState},
    handoff::{AttendanceContext, HandoffError},
    location::{LocationAcquirer, LocationError},
    models::{AttendanceRecord, Identity, PhotoHandle},
    platform::{CameraFacing, CameraService, LocationService},
    settings::PipelineSettings,
    submission::{SubmissionError, SubmissionOrchestrator},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    #[error("no confirmed location to attach a photo to")]
    NoContext,
    #[error("confirmed location is too old to use")]
    ContextExpired,
    #[error("no photo has been taken")]
    NoPhoto,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("{0}")]
    Internal(String),
}

impl PipelineError {
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::Auth(_) => "Failed to retrieve user. Please log in again.",
            PipelineError::Handoff(HandoffError::NotVerified) => {
                "You seem to be outside the allowed range. Please check your location again."
            }
            PipelineError::Handoff(HandoffError::MissingIdentity) => {
                "User or location coordinate data is missing. Please retry."
            }
            PipelineError::NoContext => "Confirm your location before taking a picture.",
            PipelineError::ContextExpired => {
                "Your location confirmation has expired. Please check your location again."
            }
            PipelineError::NoPhoto => "Take a picture before submitting attendance.",
            PipelineError::Capture(CaptureError::PermissionDenied) => {
                "We need your permission to show the camera."
            }
            PipelineError::Capture(CaptureError::CaptureInProgress) => "Capture in progress...",
            PipelineError::Capture(CaptureError::Failed(_)) => "Failed to capture photo.",
            PipelineError::Submission(SubmissionError::UploadFailed { .. }) => {
                "Failed to upload photo. Please check your location and try again."
            }
            PipelineError::Submission(SubmissionError::PersistFailed { .. }) => {
                "Failed to save attendance. Please check your location and try again."
            }
            PipelineError::Internal(_) => "An unexpected error occurred.",
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Internal(format!("{err:#}"))
    }
}

/// What the screen is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStage {
    Idle,
    Locating,
    AwaitingPhoto,
    ReadyToSubmit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextView {
    pub user_id: String,
    pub coordinate: Coordinate,
    pub captured_at: DateTime<Utc>,
}

impl From<&AttendanceContext> for ContextView {
    fn from(context: &AttendanceContext) -> Self {
        Self {
            user_id: context.user_id().to_string(),
            coordinate: context.coordinate(),
            captured_at: context.captured_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoView {
    pub local_uri: String,
    pub taken_at: DateTime<Utc>,
}

impl From<&PhotoHandle> for PhotoView {
    fn from(photo: &PhotoHandle) -> Self {
        Self {
            local_uri: photo.local_uri().to_string_lossy().into_owned(),
            taken_at: photo.taken_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    pub stage: PipelineStage,
    pub geofence: GeofenceState,
    pub message: String,
    pub radius_meters: f64,
    pub user_id: Option<String>,
    pub context: Option<ContextView>,
    pub photo: Option<PhotoView>,
    pub capturing: bool,
    pub camera_facing: CameraFacing,
}

#[derive(Default)]
struct Session {
    user: Option<Identity>,
    context: Option<AttendanceContext>,
    photo: Option<PhotoHandle>,
    /// Bumped whenever the context changes hands, so a photo that lands
    /// after its context is gone is never paired with the next one.
    attempt: u64,
}

impl Session {
    fn begin_attempt(&mut self, context: AttendanceContext) {
        self.attempt = self.attempt.wrapping_add(1);
        self.context = Some(context);
        self.photo = None;
    }

    fn discard_attempt(&mut self) {
        self.attempt = self.attempt.wrapping_add(1);
        self.context = None;
        self.photo = None;
    }
}

pub struct AttendancePipeline {
    backend: Arc<dyn AttendanceBackend>,
    evaluator: GeofenceEvaluator,
    capture: CaptureStage,
    orchestrator: SubmissionOrchestrator,
    context_max_age: Duration,
    session: Mutex<Session>,
}

impl AttendancePipeline {
    pub fn new(
        settings: &PipelineSettings,
        backend: Arc<dyn AttendanceBackend>,
        location: Arc<dyn LocationService>,
        camera: Arc<dyn CameraService>,
    ) -> Result<Self> {
        let evaluator = GeofenceEvaluator::new(
            settings.geofence,
            LocationAcquirer::new(location),
            settings.poll_interval(),
        );
        let capture = CaptureStage::new(camera, settings.capture_quality, settings.camera_facing);
        let orchestrator = SubmissionOrchestrator::new(backend.clone(), settings.utc_offset()?);

        Ok(Self {
            backend,
            evaluator,
            capture,
            orchestrator,
            context_max_age: settings.context_max_age(),
            session: Mutex::new(Session::default()),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<GeofenceState> {
        self.evaluator.subscribe()
    }

    /// Screen entry. Nothing is checked until the backend names a user.
    pub async fn enter(&self) -> Result<GeofenceState, PipelineError> {
        let user = self.backend.current_user().await.map_err(|err| {
            log_warn!("cannot start attendance check: {err}");
            err
        })?;

        {
            let mut session = self.session.lock().await;
            session.discard_attempt();
            session.user = Some(user);
        }
        Ok(self.evaluator.start().await?)
    }

    pub async fn retry_location(&self) -> GeofenceState {
        self.evaluator.retry().await
    }

    /// Freezes the current fix for the signed-in user. Polling stops here.
    pub async fn proceed(&self) -> Result<ContextView, PipelineError> {
        let mut session = self.session.lock().await;
        let user_id = session.user.as_ref().map(|user| user.id.clone());
        let context = self.evaluator.confirm(user_id.as_deref()).await?;
        let view = ContextView::from(&context);
        session.begin_attempt(context);
        Ok(view)
    }

    /// Takes (or retakes) the attendance photo for the confirmed location.
    pub async fn capture(&self) -> Result<PhotoView, PipelineError> {
        let attempt = {
            let mut session = self.session.lock().await;
            let age = match session.context.as_ref() {
                Some(context) => context.age(Utc::now()),
                None => return Err(PipelineError::NoContext),
            };
            if age.to_std().map_or(false, |age| age >= self.context_max_age) {
                log_info!("attendance context is {}s old, checking location again", age.num_seconds());
                session.discard_attempt();
                drop(session);
                self.restart_check().await;
                return Err(PipelineError::ContextExpired);
            }
            session.attempt
        };

        let photo = self.capture.capture().await?;

        let mut session = self.session.lock().await;
        if session.attempt != attempt || session.context.is_none() {
            log_info!("dropping photo {}: its context is gone", photo.local_uri().display());
            return Err(PipelineError::NoContext);
        }
        let view = PhotoView::from(&photo);
        session.photo = Some(photo);
        Ok(view)
    }

    pub fn toggle_facing(&self) -> CameraFacing {
        self.capture.toggle_facing()
    }

    /// Submits the confirmed context with the photo. Both are used up either
    /// way; on failure the location check starts over.
    pub async fn submit(&self) -> Result<AttendanceRecord, PipelineError> {
        let (context, photo) = {
            let mut session = self.session.lock().await;
            if session.context.is_none() {
                return Err(PipelineError::NoContext);
            }
            let photo = session.photo.take().ok_or(PipelineError::NoPhoto)?;
            let context = session.context.take().ok_or(PipelineError::NoContext)?;
            session.attempt = session.attempt.wrapping_add(1);
            (context, photo)
        };

        match self.orchestrator.submit(context, photo).await {
            Ok(record) => {
                if let Err(err) = self.evaluator.shutdown().await {
                    log_warn!("geofence evaluator did not shut down cleanly: {err:#}");
                }
                Ok(record)
            }
            Err(err) => {
                log_warn!("attendance submission failed: {err}");
                self.restart_check().await;
                Err(err.into())
            }
        }
    }

    /// Screen teardown. Stops polling and forgets any half-finished attempt.
    pub async fn leave(&self) -> Result<(), PipelineError> {
        self.session.lock().await.discard_attempt();
        self.evaluator.shutdown().await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> PipelineSnapshot {
        let geofence = self.evaluator.state().await;
        let polling = self.evaluator.is_active().await;
        let session = self.session.lock().await;

        let stage = match (&session.context, &session.photo) {
            (Some(_), Some(_)) => PipelineStage::ReadyToSubmit,
            (Some(_), None) => PipelineStage::AwaitingPhoto,
            (None, _) if polling => PipelineStage::Locating,
            (None, _) => PipelineStage::Idle,
        };

        PipelineSnapshot {
            stage,
            message: geofence_message(&geofence, self.evaluator.config().radius_meters()),
            geofence,
            radius_meters: self.evaluator.config().radius_meters(),
            user_id: session.user.as_ref().map(|user| user.id.clone()),
            context: session.context.as_ref().map(ContextView::from),
            photo: session.photo.as_ref().map(PhotoView::from),
            capturing: self.capture.is_capturing(),
            camera_facing: self.capture.facing(),
        }
    }

    async fn restart_check(&self) {
        if let Err(err) = self.evaluator.start().await {
            log_warn!("failed to restart location check: {err:#}");
        }
    }
}

/// Status line for the check screen.
pub fn geofence_message(state: &GeofenceState, radius_meters: f64) -> String {
    match state {
        GeofenceState::Idle => "Location check has not started.".to_string(),
        GeofenceState::Checking => "Checking location and user data...".to_string(),
        GeofenceState::Verified { verdict } => format!(
            "You are within the allowed range ({:.0} m from the target).",
            verdict.distance_meters
        ),
        GeofenceState::OutOfRange {
            verdict: Some(verdict),
            ..
        } => format!(
            "You are outside the allowed range ({:.0} m away). Move closer to the target location ({:.0} m range).",
            verdict.distance_meters, radius_meters
        ),
        GeofenceState::OutOfRange {
            failure: Some(LocationError::Timeout),
            ..
        } => "Could not get location: Request timed out. Please ensure GPS is enabled and try again."
            .to_string(),
        GeofenceState::OutOfRange { .. } => {
            "Failed to get precise location coordinates. Please try again.".to_string()
        }
        GeofenceState::PermissionBlocked => {
            "Attendance requires location access. Please grant permission in your device settings."
                .to_string()
        }
    }
}
