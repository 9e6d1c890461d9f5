#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use omni_convert::{
    ArtifactStore, ConversionError, Converter, Job, JobError, JobErrorKind, JobLifecycleManager,
    JobStateStore, JobStatus, JobTransition, LifecycleConfig, LocalArtifactStore,
    MemoryJobStateStore, NewJob, StateStoreError, StoredRecord,
};
use tempfile::TempDir;

/// Writes a fixed STEP payload after an optional delay.
struct WritingConverter {
    delay: Duration,
}

#[async_trait]
impl Converter for WritingConverter {
    async fn convert(&self, _input: &Path, output: &Path) -> Result<(), ConversionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        tokio::fs::write(output, b"ISO-10303-21;")
            .await
            .map_err(|error| ConversionError::failed(error.to_string()))
    }
}

/// Reports success without producing a file.
struct SilentConverter;

#[async_trait]
impl Converter for SilentConverter {
    async fn convert(&self, _input: &Path, _output: &Path) -> Result<(), ConversionError> {
        Ok(())
    }
}

struct FailingConverter;

#[async_trait]
impl Converter for FailingConverter {
    async fn convert(&self, _input: &Path, _output: &Path) -> Result<(), ConversionError> {
        Err(ConversionError::failed("mesh is not watertight"))
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<MemoryJobStateStore>,
    artifacts: Arc<LocalArtifactStore>,
    manager: JobLifecycleManager,
}

async fn harness(
    converter: Arc<dyn Converter>,
    retention: Duration,
    conversion_timeout: Duration,
) -> Result<Harness> {
    let dir = TempDir::new()?;
    let store = Arc::new(MemoryJobStateStore::new());
    let artifacts = Arc::new(LocalArtifactStore::new(
        dir.path().join("uploads"),
        dir.path().join("converted"),
    ));
    artifacts.ensure_areas().await?;
    let manager = JobLifecycleManager::new(
        store.clone(),
        artifacts.clone(),
        converter,
        LifecycleConfig {
            retention,
            conversion_timeout,
        },
    );
    Ok(Harness {
        _dir: dir,
        store,
        artifacts,
        manager,
    })
}

async fn staged_job(artifacts: &LocalArtifactStore, stem: &str) -> Result<NewJob> {
    let input_path = artifacts.upload_path(&format!("{stem}.stl"));
    tokio::fs::write(&input_path, b"solid cube\nendsolid cube\n").await?;
    Ok(NewJob {
        input_path,
        output_path: artifacts.output_path(&format!("{stem}.step")),
        output_filename: format!("{stem}.step"),
        original_filename: "cube.stl".to_string(),
    })
}

#[tokio::test]
async fn successful_conversion_is_downloadable() -> Result<()> {
    let h = harness(
        Arc::new(WritingConverter {
            delay: Duration::ZERO,
        }),
        Duration::from_secs(3600),
        Duration::from_secs(30),
    )
    .await?;
    let request = staged_job(&h.artifacts, "a1").await?;

    let job = h.manager.submit(request).await?;
    assert_eq!(job.status(), JobStatus::Completed);
    assert!(job.completed_at().is_some());

    let view = h.manager.get_job(job.job_id()).await?;
    assert_eq!(view.job.status(), JobStatus::Completed);
    let report = serde_json::to_value(view.report())?;
    assert_eq!(report["status"], "completed");
    assert_eq!(report["originalFilename"], "cube.stl");
    assert!(report.get("completedAt").is_some());

    let download = h.manager.retrieve_artifact(job.job_id()).await?;
    assert_eq!(download.filename, "a1.step");
    assert_eq!(download.size_bytes, 13);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn status_update_never_extends_remaining_ttl() -> Result<()> {
    let h = harness(
        Arc::new(WritingConverter {
            delay: Duration::from_secs(4),
        }),
        Duration::from_secs(10),
        Duration::from_secs(30),
    )
    .await?;
    let request = staged_job(&h.artifacts, "ttl").await?;

    let job = h.manager.create_job(request).await?;
    let before = h.manager.get_job(job.job_id()).await?.expires_in;
    assert!(before <= Duration::from_secs(10));

    let completed = h.manager.run_conversion(&job).await?;
    assert_eq!(completed.status(), JobStatus::Completed);

    let after = h.manager.get_job(job.job_id()).await?.expires_in;
    assert!(after <= Duration::from_secs(6), "remaining ttl grew to {after:?}");
    assert!(after < before);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn expired_job_reads_as_not_found() -> Result<()> {
    let h = harness(
        Arc::new(WritingConverter {
            delay: Duration::ZERO,
        }),
        Duration::from_secs(2),
        Duration::from_secs(30),
    )
    .await?;
    let request = staged_job(&h.artifacts, "exp").await?;
    let job = h.manager.submit(request).await?;

    tokio::time::advance(Duration::from_secs(3)).await;

    let err = h.manager.get_job(job.job_id()).await.unwrap_err();
    assert!(matches!(err, JobError::NotFound { .. }));
    assert_eq!(err.kind(), JobErrorKind::NotFound);
    let err = h.manager.retrieve_artifact(job.job_id()).await.unwrap_err();
    assert_eq!(err.kind(), JobErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn fresh_job_reports_full_window_then_expires() -> Result<()> {
    let h = harness(
        Arc::new(SilentConverter),
        Duration::from_secs(2),
        Duration::from_secs(30),
    )
    .await?;
    let request = staged_job(&h.artifacts, "window").await?;
    let job = h.manager.create_job(request).await?;

    let report = h.manager.get_job(job.job_id()).await?.report();
    assert_eq!(report.status, JobStatus::Processing);
    assert_eq!(report.expires_in, 2);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let err = h.manager.get_job(job.job_id()).await.unwrap_err();
    assert_eq!(err.kind(), JobErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn unknown_job_reads_as_not_found() -> Result<()> {
    let h = harness(
        Arc::new(SilentConverter),
        Duration::from_secs(60),
        Duration::from_secs(30),
    )
    .await?;
    let err = h.manager.get_job("no-such-job").await.unwrap_err();
    assert_eq!(err.to_string(), "Job not found or expired: no-such-job");
    assert_eq!(err.kind(), JobErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn failed_conversion_is_recorded_and_blocks_download() -> Result<()> {
    let h = harness(
        Arc::new(FailingConverter),
        Duration::from_secs(3600),
        Duration::from_secs(30),
    )
    .await?;
    let request = staged_job(&h.artifacts, "bad").await?;
    let job = h.manager.create_job(request).await?;

    let err = h.manager.run_conversion(&job).await.unwrap_err();
    assert_eq!(err.kind(), JobErrorKind::ConversionFailure);
    assert!(err.to_string().contains("mesh is not watertight"));

    let view = h.manager.get_job(job.job_id()).await?;
    assert_eq!(view.job.status(), JobStatus::Failed);
    assert_eq!(
        view.job.error(),
        Some("Conversion failed: mesh is not watertight")
    );

    let err = h.manager.retrieve_artifact(job.job_id()).await.unwrap_err();
    assert!(matches!(
        err,
        JobError::NotCompleted {
            status: "failed",
            ..
        }
    ));
    assert_eq!(err.kind(), JobErrorKind::Conflict);
    assert_eq!(err.to_string(), "Cannot download: job status is failed");
    Ok(())
}

#[tokio::test]
async fn processing_job_cannot_be_downloaded() -> Result<()> {
    let h = harness(
        Arc::new(SilentConverter),
        Duration::from_secs(3600),
        Duration::from_secs(30),
    )
    .await?;
    let request = staged_job(&h.artifacts, "busy").await?;
    let job = h.manager.create_job(request).await?;

    let err = h.manager.retrieve_artifact(job.job_id()).await.unwrap_err();
    assert!(matches!(
        err,
        JobError::NotCompleted {
            status: "processing",
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn completed_job_without_artifact_is_a_conflict() -> Result<()> {
    let h = harness(
        Arc::new(SilentConverter),
        Duration::from_secs(3600),
        Duration::from_secs(30),
    )
    .await?;
    let request = staged_job(&h.artifacts, "ghost").await?;
    let job = h.manager.submit(request).await?;
    assert_eq!(job.status(), JobStatus::Completed);

    let err = h.manager.retrieve_artifact(job.job_id()).await.unwrap_err();
    assert!(matches!(err, JobError::ArtifactMissing { .. }));
    assert_eq!(err.kind(), JobErrorKind::Conflict);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_conversion_times_out_and_is_recorded_as_failed() -> Result<()> {
    let h = harness(
        Arc::new(WritingConverter {
            delay: Duration::from_secs(600),
        }),
        Duration::from_secs(3600),
        Duration::from_secs(5),
    )
    .await?;
    let request = staged_job(&h.artifacts, "slow").await?;
    let job = h.manager.create_job(request).await?;

    let err = h.manager.run_conversion(&job).await.unwrap_err();
    assert!(matches!(
        err,
        JobError::Conversion(ConversionError::TimedOut { timeout_secs: 5 })
    ));

    let view = h.manager.get_job(job.job_id()).await?;
    assert_eq!(view.job.status(), JobStatus::Failed);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn outcome_after_expiry_does_not_recreate_record() -> Result<()> {
    let h = harness(
        Arc::new(WritingConverter {
            delay: Duration::from_secs(3),
        }),
        Duration::from_secs(2),
        Duration::from_secs(30),
    )
    .await?;
    let request = staged_job(&h.artifacts, "late").await?;
    let job = h.manager.create_job(request).await?;

    let err = h.manager.run_conversion(&job).await.unwrap_err();
    assert!(matches!(err, JobError::NotFound { .. }));

    // Still the original processing record, awaiting the sweeper.
    match h.store.inspect(job.job_id()).await? {
        StoredRecord::Expired(stored) => assert_eq!(stored.status(), JobStatus::Processing),
        other => panic!("expected expired record, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn terminal_job_cannot_be_converted_again() -> Result<()> {
    let h = harness(
        Arc::new(SilentConverter),
        Duration::from_secs(3600),
        Duration::from_secs(30),
    )
    .await?;
    let request = staged_job(&h.artifacts, "twice").await?;
    let completed = h.manager.submit(request).await?;

    let err = h.manager.run_conversion(&completed).await.unwrap_err();
    assert!(matches!(err, JobError::InvalidTransition { .. }));
    assert_eq!(err.kind(), JobErrorKind::Conflict);
    Ok(())
}

/// State store whose every command fails as if the server were down.
struct DownStore;

fn connection_refused(operation: &'static str) -> StateStoreError {
    StateStoreError::Unavailable {
        operation,
        message: "connection refused".to_string(),
    }
}

#[async_trait]
impl JobStateStore for DownStore {
    fn backend_name(&self) -> &'static str {
        "down"
    }

    async fn insert_new(&self, _job: &Job, _ttl: Duration) -> Result<(), StateStoreError> {
        Err(connection_refused("insert_new"))
    }

    async fn inspect(&self, _job_id: &str) -> Result<StoredRecord, StateStoreError> {
        Err(connection_refused("inspect"))
    }

    async fn update_keep_ttl(&self, _transition: &JobTransition) -> Result<bool, StateStoreError> {
        Err(connection_refused("update_keep_ttl"))
    }

    async fn delete(&self, _job_id: &str) -> Result<bool, StateStoreError> {
        Err(connection_refused("delete"))
    }

    async fn list_job_ids(&self) -> Result<Vec<String>, StateStoreError> {
        Err(connection_refused("list_job_ids"))
    }
}

#[tokio::test]
async fn unreachable_store_surfaces_as_server_error() -> Result<()> {
    let dir = TempDir::new()?;
    let artifacts = Arc::new(LocalArtifactStore::new(
        dir.path().join("uploads"),
        dir.path().join("converted"),
    ));
    artifacts.ensure_areas().await?;
    let manager = JobLifecycleManager::new(
        Arc::new(DownStore),
        artifacts.clone(),
        Arc::new(SilentConverter),
        LifecycleConfig::default(),
    );
    let request = staged_job(&artifacts, "down").await?;

    let err = manager.create_job(request).await.unwrap_err();
    assert!(matches!(err, JobError::StateStoreUnavailable(_)));
    assert_eq!(err.kind(), JobErrorKind::ServerError);
    assert!(err.to_string().contains("connection refused"));

    let err = manager.get_job("any-job").await.unwrap_err();
    assert_eq!(err.kind(), JobErrorKind::ServerError);
    Ok(())
}
