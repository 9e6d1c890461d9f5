//! Artifact store: physical input/output files on local durable storage.
//!
//! Artifacts carry their own age signal (last-modified time) and are not
//! required to have a job record at all times.

mod local;
mod naming;

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

pub use local::LocalArtifactStore;
pub use naming::{UploadRejected, output_filename_for, stored_upload_name, validate_upload};

/// Storage area an artifact lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactArea {
    /// Uploaded inputs.
    Upload,
    /// Converter outputs.
    Output,
}

impl ArtifactArea {
    /// Label for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Output => "output",
        }
    }
}

/// One file found while scanning the artifact areas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    /// Full path of the file.
    pub path: PathBuf,
    /// Area the file was found in.
    pub area: ArtifactArea,
    /// Last-modified time.
    pub modified: SystemTime,
}

impl ArtifactEntry {
    /// Age relative to `now`; zero for files modified in the future.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.modified).unwrap_or_default()
    }
}

/// Result of scanning both areas.
#[derive(Debug, Default)]
pub struct ArtifactScan {
    /// Files found.
    pub entries: Vec<ArtifactEntry>,
    /// Entries or areas that could not be read.
    pub failures: usize,
}

/// Size and age of one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactMetadata {
    /// File length in bytes.
    pub size_bytes: u64,
    /// Last-modified time.
    pub modified: SystemTime,
}

/// Outcome of a delete that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The file existed and was removed.
    Deleted,
    /// Nothing was there (already removed).
    Missing,
}

/// File operations the lifecycle manager and sweeper need.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Create the upload and output areas if absent.
    async fn ensure_areas(&self) -> io::Result<()>;

    /// Path for a file name inside the upload area.
    fn upload_path(&self, file_name: &str) -> PathBuf;

    /// Path for a file name inside the output area.
    fn output_path(&self, file_name: &str) -> PathBuf;

    /// Metadata for a readable regular file, `None` when absent.
    async fn metadata(&self, path: &Path) -> io::Result<Option<ArtifactMetadata>>;

    /// Whether a readable regular file exists at `path`.
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        Ok(self.metadata(path).await?.is_some())
    }

    /// Remove a file. A missing file is reported as [`DeleteOutcome::Missing`], not an error.
    async fn delete(&self, path: &Path) -> io::Result<DeleteOutcome>;

    /// Enumerate regular files in both areas.
    async fn scan(&self) -> ArtifactScan;
}
