use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs as tokio_fs;

use crate::observability::JobEvent;

use super::{
    ArtifactArea, ArtifactEntry, ArtifactMetadata, ArtifactScan, ArtifactStore, DeleteOutcome,
};

/// Artifact store over two local directories, using `tokio::fs`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    async fn scan_area(&self, area: ArtifactArea, dir: &Path, scan: &mut ArtifactScan) {
        let mut reader = match tokio_fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return,
            Err(error) => {
                tracing::warn!(
                    area = area.as_str(),
                    path = %dir.display(),
                    error = %error,
                    "failed to scan artifact area"
                );
                scan.failures += 1;
                return;
            }
        };
        loop {
            let entry = match reader.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(
                        area = area.as_str(),
                        path = %dir.display(),
                        error = %error,
                        "failed to read artifact area entry"
                    );
                    scan.failures += 1;
                    break;
                }
            };
            let path = entry.path();
            match entry.metadata().await {
                Ok(meta) if meta.is_file() => match meta.modified() {
                    Ok(modified) => scan.entries.push(ArtifactEntry {
                        path,
                        area,
                        modified,
                    }),
                    Err(error) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %error,
                            "artifact mtime unavailable"
                        );
                        scan.failures += 1;
                    }
                },
                Ok(_) => {}
                // Removed between listing and stat.
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %error,
                        "failed to stat artifact"
                    );
                    scan.failures += 1;
                }
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn ensure_areas(&self) -> io::Result<()> {
        tokio_fs::create_dir_all(&self.upload_dir).await?;
        tokio_fs::create_dir_all(&self.output_dir).await?;
        tracing::debug!(
            event = JobEvent::ArtifactAreasReady.as_str(),
            upload_dir = %self.upload_dir.display(),
            output_dir = %self.output_dir.display(),
            "artifact areas ready"
        );
        Ok(())
    }

    fn upload_path(&self, file_name: &str) -> PathBuf {
        self.upload_dir.join(file_name)
    }

    fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    async fn metadata(&self, path: &Path) -> io::Result<Option<ArtifactMetadata>> {
        match tokio_fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(ArtifactMetadata {
                size_bytes: meta.len(),
                modified: meta.modified()?,
            })),
            Ok(_) => Ok(None),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn delete(&self, path: &Path) -> io::Result<DeleteOutcome> {
        match tokio_fs::remove_file(path).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(DeleteOutcome::Missing),
            Err(error) => Err(error),
        }
    }

    async fn scan(&self) -> ArtifactScan {
        let mut scan = ArtifactScan::default();
        self.scan_area(ArtifactArea::Upload, &self.upload_dir, &mut scan)
            .await;
        self.scan_area(ArtifactArea::Output, &self.output_dir, &mut scan)
            .await;
        scan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> LocalArtifactStore {
        LocalArtifactStore::new(dir.path().join("up"), dir.path().join("out"))
    }

    #[tokio::test]
    async fn delete_reports_missing_files_without_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = store_in(&dir);
        store.ensure_areas().await.expect("create areas");

        let path = store.upload_path("a.stl");
        tokio_fs::write(&path, b"solid a").await.expect("write upload");
        assert!(store.exists(&path).await.expect("stat upload"));
        let first = store.delete(&path).await.expect("first delete");
        assert_eq!(first, DeleteOutcome::Deleted);
        let second = store.delete(&path).await.expect("second delete");
        assert_eq!(second, DeleteOutcome::Missing);
        assert!(!store.exists(&path).await.expect("stat after delete"));
    }

    #[tokio::test]
    async fn scan_lists_files_in_both_areas_and_skips_directories() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = store_in(&dir);
        store.ensure_areas().await.expect("create areas");
        tokio_fs::write(store.upload_path("a.stl"), b"solid a")
            .await
            .expect("write upload");
        tokio_fs::write(store.output_path("a.step"), b"ISO-10303-21;")
            .await
            .expect("write output");
        tokio_fs::create_dir(store.output_path("nested"))
            .await
            .expect("create nested dir");

        let scan = store.scan().await;
        assert_eq!(scan.failures, 0);
        let mut areas: Vec<_> = scan.entries.iter().map(|e| e.area).collect();
        areas.sort_by_key(|a| a.as_str());
        assert_eq!(areas, vec![ArtifactArea::Output, ArtifactArea::Upload]);
    }

    #[tokio::test]
    async fn scan_of_missing_areas_is_empty_not_failed() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = store_in(&dir);
        let scan = store.scan().await;
        assert!(scan.entries.is_empty());
        assert_eq!(scan.failures, 0);
    }
}
