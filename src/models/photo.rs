use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A photo sitting on local storage, waiting to be uploaded.
///
/// Only the capture stage creates handles and the submission orchestrator
/// takes them by value, so a handle cannot be submitted twice.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoHandle {
    local_uri: PathBuf,
    taken_at: DateTime<Utc>,
    width: Option<u32>,
    height: Option<u32>,
}

impl PhotoHandle {
    pub(crate) fn new(
        local_uri: PathBuf,
        taken_at: DateTime<Utc>,
        dimensions: Option<(u32, u32)>,
    ) -> Self {
        Self {
            local_uri,
            taken_at,
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
        }
    }

    pub fn local_uri(&self) -> &Path {
        &self.local_uri
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }

    /// File extension used for the uploaded object name.
    pub fn extension(&self) -> &str {
        self.local_uri
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or("jpg")
    }
}
