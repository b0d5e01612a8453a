use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::{
    db::Database,
    models::{AbsenceReport, AttendanceRecord, Identity, RecordId},
};

use super::{AttendanceBackend, AuthError, BackendError, SessionStore};

/// Keeps photos in a directory and records in SQLite.
#[derive(Clone)]
pub struct LocalBackend {
    db: Database,
    photo_dir: Arc<PathBuf>,
    session: Arc<SessionStore>,
}

impl LocalBackend {
    pub fn new(db: Database, photo_dir: PathBuf, session: Arc<SessionStore>) -> Result<Self> {
        std::fs::create_dir_all(&photo_dir)
            .with_context(|| format!("failed to create photo directory {}", photo_dir.display()))?;
        Ok(Self {
            db,
            photo_dir: Arc::new(photo_dir),
            session,
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn photo_dir(&self) -> &Path {
        self.photo_dir.as_path()
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Writes `bytes` to `name` in the photo directory, suffixed `-1`, `-2`,
    /// ... when the name is taken. Files are created exclusively, so two
    /// uploads under one name never land on the same path.
    async fn write_photo(&self, bytes: Vec<u8>, name: &str) -> Result<PathBuf> {
        let name = sanitize_object_name(name);
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) => (stem, format!(".{ext}")),
            None => (name.as_str(), String::new()),
        };

        let mut n = 0u32;
        let (path, mut file) = loop {
            let candidate = if n == 0 {
                self.photo_dir.join(&name)
            } else {
                self.photo_dir.join(format!("{stem}-{n}{ext}"))
            };
            match OpenOptions::new().write(true).create_new(true).open(&candidate).await {
                Ok(file) => break (candidate, file),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to create photo {}", candidate.display()))
                }
            }
        };

        file.write_all(&bytes)
            .await
            .with_context(|| format!("failed to write photo {}", path.display()))?;
        file.flush().await?;
        Ok(path)
    }
}

const FALLBACK_OBJECT_NAME: &str = "photo";

/// Keeps object names flat and filesystem-safe.
fn sanitize_object_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();
    match cleaned.trim_start_matches('.') {
        "" => FALLBACK_OBJECT_NAME.to_string(),
        trimmed => trimmed.to_string(),
    }
}

#[async_trait]
impl AttendanceBackend for LocalBackend {
    async fn current_user(&self) -> Result<Identity, AuthError> {
        self.session.current().ok_or(AuthError::NotSignedIn)
    }

    async fn upload_photo(&self, bytes: Vec<u8>, name: &str) -> Result<String, BackendError> {
        let size = bytes.len();
        let path = self
            .write_photo(bytes, name)
            .await
            .map_err(|err| BackendError::Storage(format!("{err:#}")))?;
        info!("Stored photo {} ({} bytes)", path.display(), size);
        Ok(path.to_string_lossy().into_owned())
    }

    async fn insert_attendance_record(
        &self,
        record: &AttendanceRecord,
    ) -> Result<RecordId, BackendError> {
        self.db
            .insert_attendance_record(record)
            .await
            .map_err(|err| BackendError::Database(format!("{err:#}")))
    }

    async fn insert_absence_report(
        &self,
        report: &AbsenceReport,
    ) -> Result<RecordId, BackendError> {
        self.db
            .insert_absence_report(report)
            .await
            .map_err(|err| BackendError::Database(format!("{err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(dir: &Path) -> LocalBackend {
        let db = Database::new(dir.join("attendance.sqlite3")).unwrap();
        LocalBackend::new(db, dir.join("photos"), Arc::new(SessionStore::new())).unwrap()
    }

    #[test]
    fn object_names_are_flattened() {
        assert_eq!(
            sanitize_object_name("1700000000000_../etc/passwd.jpg"),
            "1700000000000_.._etc_passwd.jpg"
        );
        assert_eq!(sanitize_object_name("../x.jpg"), "_x.jpg");
        assert_eq!(sanitize_object_name("..."), "photo");
        assert_eq!(sanitize_object_name(""), "photo");
    }

    #[tokio::test]
    async fn current_user_follows_session() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        assert_eq!(backend.current_user().await, Err(AuthError::NotSignedIn));

        let user = Identity {
            id: "u-1".into(),
            email: Some("siswa@example.com".into()),
        };
        backend.session().set_user(user.clone());
        assert_eq!(backend.current_user().await, Ok(user));

        backend.session().clear();
        assert_eq!(backend.current_user().await, Err(AuthError::NotSignedIn));
    }

    #[tokio::test]
    async fn upload_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());

        let first = backend
            .upload_photo(b"jpeg bytes".to_vec(), "1700000000000_u-1.jpg")
            .await
            .unwrap();
        let first = PathBuf::from(&first);
        assert!(first.starts_with(backend.photo_dir()));
        assert_eq!(std::fs::read(&first).unwrap(), b"jpeg bytes");

        let second = backend
            .upload_photo(b"other".to_vec(), "1700000000000_u-1.jpg")
            .await
            .unwrap();
        assert!(second.ends_with("1700000000000_u-1-1.jpg"));
        assert_eq!(std::fs::read(&first).unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn dot_only_name_still_gets_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());

        let stored = backend.upload_photo(b"jpeg".to_vec(), "..").await.unwrap();
        let stored = PathBuf::from(stored);
        assert_eq!(stored, backend.photo_dir().join("photo"));
        assert_eq!(std::fs::read(&stored).unwrap(), b"jpeg");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_uploads_under_one_name_keep_every_photo() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());

        let uploads: Vec<_> = (0..8u8)
            .map(|i| {
                let backend = backend.clone();
                tokio::spawn(async move {
                    let path = backend.upload_photo(vec![i; 64], "same.jpg").await.unwrap();
                    (i, PathBuf::from(path))
                })
            })
            .collect();

        let mut paths = Vec::new();
        for upload in uploads {
            let (i, path) = upload.await.unwrap();
            assert_eq!(std::fs::read(&path).unwrap(), vec![i; 64]);
            paths.push(path);
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
    }
}
