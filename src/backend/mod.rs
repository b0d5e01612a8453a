//! The attendance backend: identity, photo storage and record storage.
//!
//! The pipeline only depends on [`AttendanceBackend`]; `local` is the
//! SQLite + photo directory implementation the app ships with.

pub mod local;
pub mod session;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{AbsenceReport, AttendanceRecord, Identity, RecordId};

pub use local::LocalBackend;
pub use session::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum AuthError {
    #[error("not signed in")]
    NotSignedIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum BackendError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("database error: {0}")]
    Database(String),
}

#[async_trait]
pub trait AttendanceBackend: Send + Sync {
    async fn current_user(&self) -> Result<Identity, AuthError>;

    /// Stores `bytes` under `name` and returns the address of the object.
    async fn upload_photo(&self, bytes: Vec<u8>, name: &str) -> Result<String, BackendError>;

    async fn insert_attendance_record(
        &self,
        record: &AttendanceRecord,
    ) -> Result<RecordId, BackendError>;

    async fn insert_absence_report(&self, report: &AbsenceReport)
        -> Result<RecordId, BackendError>;
}
