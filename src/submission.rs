use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::{
    backend::{AttendanceBackend, BackendError},
    handoff::AttendanceContext,
    models::{AttendanceRecord, AttendanceStatus, PhotoHandle},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SubmissionError {
    #[error("failed to upload attendance photo: {reason}")]
    UploadFailed { reason: String },
    /// The photo is already stored at `photo_reference` but no record
    /// points at it.
    #[error("failed to save attendance record: {reason}")]
    PersistFailed {
        photo_reference: String,
        reason: String,
    },
}

/// Upload, then insert. The two steps are not transactional and nothing is
/// retried; a failure is reported for the caller to surface.
pub struct SubmissionOrchestrator {
    backend: Arc<dyn AttendanceBackend>,
    utc_offset: FixedOffset,
}

impl SubmissionOrchestrator {
    pub fn new(backend: Arc<dyn AttendanceBackend>, utc_offset: FixedOffset) -> Self {
        Self {
            backend,
            utc_offset,
        }
    }

    /// Consumes both the context and the photo: whatever the outcome, a new
    /// attempt starts from a fresh check.
    pub async fn submit(
        &self,
        context: AttendanceContext,
        photo: PhotoHandle,
    ) -> Result<AttendanceRecord, SubmissionError> {
        let name = photo_object_name(&context, &photo);
        let bytes = tokio::fs::read(photo.local_uri())
            .await
            .map_err(|err| SubmissionError::UploadFailed {
                reason: format!("cannot read {}: {err}", photo.local_uri().display()),
            })?;

        let photo_reference = self
            .backend
            .upload_photo(bytes, &name)
            .await
            .map_err(|err: BackendError| {
                log_warn!("photo upload for {} failed: {err}", context.user_id());
                SubmissionError::UploadFailed {
                    reason: err.to_string(),
                }
            })?;

        let mut record = AttendanceRecord {
            id: None,
            user_id: context.user_id().to_string(),
            date: context
                .captured_at()
                .with_timezone(&self.utc_offset)
                .date_naive(),
            coordinate: context.coordinate(),
            photo_reference,
            status: AttendanceStatus::Present,
            checked_in_at: Utc::now(),
        };

        match self.backend.insert_attendance_record(&record).await {
            Ok(id) => {
                log_info!("attendance {id} recorded for {} on {}", record.user_id, record.date);
                record.id = Some(id);
                Ok(record)
            }
            Err(err) => {
                log_warn!(
                    "attendance insert failed, photo {} left without a record: {err}",
                    record.photo_reference
                );
                Err(SubmissionError::PersistFailed {
                    photo_reference: record.photo_reference,
                    reason: err.to_string(),
                })
            }
        }
    }
}

/// `{taken_at_ms}_{user}.{ext}`, with the user id reduced to characters that
/// are safe in an object name.
fn photo_object_name(context: &AttendanceContext, photo: &PhotoHandle) -> String {
    let user: String = context
        .user_id()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!(
        "{}_{}.{}",
        photo.taken_at().timestamp_millis(),
        user,
        photo.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::AuthError,
        geo::Coordinate,
        geofence::GeofenceVerdict,
        handoff,
        models::{AbsenceReport, Identity, LocationSample, RecordId},
    };
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    #[derive(Default)]
    struct MockBackend {
        fail_upload: bool,
        fail_insert: bool,
        uploads: AtomicUsize,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl AttendanceBackend for MockBackend {
        async fn current_user(&self) -> Result<Identity, AuthError> {
            Err(AuthError::NotSignedIn)
        }

        async fn upload_photo(&self, bytes: Vec<u8>, name: &str) -> Result<String, BackendError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            assert!(!bytes.is_empty());
            if self.fail_upload {
                return Err(BackendError::Storage("bucket unavailable".into()));
            }
            Ok(format!("https://storage.example/attendance-photos/{name}"))
        }

        async fn insert_attendance_record(
            &self,
            _record: &AttendanceRecord,
        ) -> Result<RecordId, BackendError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_insert {
                return Err(BackendError::Database("constraint violation".into()));
            }
            Ok("rec-1".into())
        }

        async fn insert_absence_report(
            &self,
            _report: &AbsenceReport,
        ) -> Result<RecordId, BackendError> {
            unreachable!("not used by submissions")
        }
    }

    fn context(user: &str) -> AttendanceContext {
        let verdict = GeofenceVerdict {
            within_range: true,
            distance_meters: 42.0,
            sample: LocationSample::new(
                Coordinate::new(-7.4501, 110.2212).unwrap(),
                // 23:30 UTC is already the next day at +07:00.
                Utc.with_ymd_and_hms(2025, 3, 4, 23, 30, 0).unwrap(),
            ),
        };
        handoff::confirm(&verdict, Some(user)).unwrap()
    }

    fn photo(dir: &Path, bytes: &[u8]) -> PhotoHandle {
        let path = dir.join("shot.jpg");
        std::fs::write(&path, bytes).unwrap();
        PhotoHandle::new(
            path,
            Utc.with_ymd_and_hms(2025, 3, 4, 23, 31, 0).unwrap(),
            None,
        )
    }

    fn orchestrator(backend: Arc<MockBackend>) -> SubmissionOrchestrator {
        SubmissionOrchestrator::new(backend, FixedOffset::east_opt(7 * 3600).unwrap())
    }

    #[tokio::test]
    async fn records_frozen_context_and_uploaded_photo() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::default());

        let record = orchestrator(backend.clone())
            .submit(context("user/42"), photo(dir.path(), b"jpeg"))
            .await
            .unwrap();

        assert_eq!(record.id.as_deref(), Some("rec-1"));
        assert_eq!(record.user_id, "user/42");
        assert_eq!(record.coordinate, Coordinate::new(-7.4501, 110.2212).unwrap());
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
        assert_eq!(record.status, AttendanceStatus::Present);
        assert!(record.photo_reference.ends_with("_user_42.jpg"));
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(backend.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn upload_failure_skips_insert() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend {
            fail_upload: true,
            ..Default::default()
        });

        let err = orchestrator(backend.clone())
            .submit(context("u-1"), photo(dir.path(), b"jpeg"))
            .await
            .unwrap_err();

        assert!(matches!(err, SubmissionError::UploadFailed { .. }));
        assert_eq!(backend.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreadable_photo_is_an_upload_failure() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::default());
        let photo = photo(dir.path(), b"jpeg");
        std::fs::remove_file(photo.local_uri()).unwrap();

        let err = orchestrator(backend.clone())
            .submit(context("u-1"), photo)
            .await
            .unwrap_err();

        assert!(matches!(err, SubmissionError::UploadFailed { .. }));
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 0);
        assert_eq!(backend.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn insert_failure_reports_orphaned_photo() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend {
            fail_insert: true,
            ..Default::default()
        });

        let err = orchestrator(backend.clone())
            .submit(context("u-1"), photo(dir.path(), b"jpeg"))
            .await
            .unwrap_err();

        match err {
            SubmissionError::PersistFailed {
                photo_reference, ..
            } => assert!(photo_reference.ends_with("_u-1.jpg")),
            other => panic!("expected PersistFailed, got {other:?}"),
        }
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(backend.inserts.load(Ordering::SeqCst), 1);
    }
}
