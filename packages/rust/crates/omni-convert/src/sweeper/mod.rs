//! Reconciliation sweeper: reclaims expired job records and aged artifacts.
//!
//! One pass runs two phases over stores that are never transactionally linked:
//! 1. job-driven: every expired record has both artifacts and the record removed;
//! 2. age-driven: every artifact older than the retention window is removed.
//!
//! Per-item failures are counted, never propagated. Passes never overlap: a
//! run-lock makes a second concurrent pass wait ([`Sweeper::sweep`]) or skip
//! ([`Sweeper::try_sweep`]).

mod schedule;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::artifacts::{ArtifactStore, DeleteOutcome};
use crate::jobs::{Job, JobStatus};
use crate::observability::JobEvent;
use crate::store::{JobStateStore, StoredRecord};

pub use schedule::{
    DEFAULT_SWEEP_SCHEDULE, InvalidSweepSchedule, SweepSchedule, SweeperHandle,
    spawn_scheduled_sweeps,
};

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    /// Artifact files removed.
    pub files_deleted: u64,
    /// Job records removed.
    pub jobs_deleted: u64,
    /// Store or file operations that failed.
    pub errors: u64,
    /// Live completed jobs whose output artifact is missing.
    pub inconsistent_jobs: u64,
}

impl SweepSummary {
    /// Whether the pass removed nothing and hit no errors.
    pub fn is_noop(&self) -> bool {
        self.files_deleted == 0 && self.jobs_deleted == 0 && self.errors == 0
    }
}

/// Result of [`Sweeper::try_sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepRun {
    /// A full pass ran.
    Completed(SweepSummary),
    /// Another pass held the run-lock.
    Skipped,
}

/// Lifetime counters of a sweeper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweeperStats {
    pub completed_runs: u64,
    pub skipped_runs: u64,
}

/// Periodic reconciler of the job state store and the artifact store.
pub struct Sweeper {
    store: Arc<dyn JobStateStore>,
    artifacts: Arc<dyn ArtifactStore>,
    retention: Duration,
    run_lock: Mutex<()>,
    completed_runs: AtomicU64,
    skipped_runs: AtomicU64,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn JobStateStore>,
        artifacts: Arc<dyn ArtifactStore>,
        retention: Duration,
    ) -> Self {
        Self {
            store,
            artifacts,
            retention,
            run_lock: Mutex::new(()),
            completed_runs: AtomicU64::new(0),
            skipped_runs: AtomicU64::new(0),
        }
    }

    /// Age threshold for orphaned artifacts.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn stats(&self) -> SweeperStats {
        SweeperStats {
            completed_runs: self.completed_runs.load(Ordering::Relaxed),
            skipped_runs: self.skipped_runs.load(Ordering::Relaxed),
        }
    }

    /// Run one full pass, waiting for any pass already in progress.
    pub async fn sweep(&self) -> SweepSummary {
        let _guard = self.run_lock.lock().await;
        self.sweep_locked().await
    }

    /// Run one full pass unless another is in progress.
    pub async fn try_sweep(&self) -> SweepRun {
        let Ok(_guard) = self.run_lock.try_lock() else {
            self.skipped_runs.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                event = JobEvent::SweepSkipped.as_str(),
                "previous sweep still running; skipping"
            );
            return SweepRun::Skipped;
        };
        SweepRun::Completed(self.sweep_locked().await)
    }

    async fn sweep_locked(&self) -> SweepSummary {
        tracing::info!(
            event = JobEvent::SweepStarted.as_str(),
            backend = self.store.backend_name(),
            retention_secs = self.retention.as_secs(),
            "running cleanup sweep"
        );
        let mut summary = SweepSummary::default();
        self.reclaim_expired_jobs(&mut summary).await;
        self.reclaim_aged_artifacts(&mut summary).await;
        self.completed_runs.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            event = JobEvent::SweepFinished.as_str(),
            files_deleted = summary.files_deleted,
            jobs_deleted = summary.jobs_deleted,
            errors = summary.errors,
            inconsistent_jobs = summary.inconsistent_jobs,
            "cleanup sweep completed"
        );
        summary
    }

    async fn reclaim_expired_jobs(&self, summary: &mut SweepSummary) {
        let job_ids = match self.store.list_job_ids().await {
            Ok(ids) => ids,
            Err(error) => {
                summary.errors += 1;
                tracing::warn!(
                    event = JobEvent::SweepItemFailed.as_str(),
                    phase = "jobs",
                    error = %error,
                    "failed to enumerate job records"
                );
                return;
            }
        };

        for job_id in job_ids {
            let record = match self.store.inspect(&job_id).await {
                Ok(record) => record,
                Err(error) => {
                    summary.errors += 1;
                    tracing::warn!(
                        event = JobEvent::SweepItemFailed.as_str(),
                        phase = "jobs",
                        job_id = %job_id,
                        error = %error,
                        "failed to read job record"
                    );
                    continue;
                }
            };
            match record {
                // Evicted by the store itself; its files are left to the age pass.
                StoredRecord::Gone => {}
                StoredRecord::Expired(job) => self.reclaim_job(&job, summary).await,
                StoredRecord::Live { job, .. } => self.check_live_job(&job, summary).await,
            }
        }
    }

    async fn reclaim_job(&self, job: &Job, summary: &mut SweepSummary) {
        self.delete_artifact(job.input_path(), summary).await;
        self.delete_artifact(job.output_path(), summary).await;
        match self.store.delete(job.job_id()).await {
            Ok(true) => {
                summary.jobs_deleted += 1;
                tracing::debug!(
                    event = JobEvent::SweepJobReclaimed.as_str(),
                    job_id = job.job_id(),
                    status = %job.status(),
                    "expired job reclaimed"
                );
            }
            Ok(false) => {}
            Err(error) => {
                summary.errors += 1;
                tracing::warn!(
                    event = JobEvent::SweepItemFailed.as_str(),
                    phase = "jobs",
                    job_id = job.job_id(),
                    error = %error,
                    "failed to delete expired job record"
                );
            }
        }
    }

    async fn check_live_job(&self, job: &Job, summary: &mut SweepSummary) {
        if job.status() != JobStatus::Completed {
            return;
        }
        match self.artifacts.exists(job.output_path()).await {
            Ok(true) => {}
            Ok(false) => {
                summary.inconsistent_jobs += 1;
                tracing::warn!(
                    event = JobEvent::SweepInconsistentJob.as_str(),
                    job_id = job.job_id(),
                    path = %job.output_path().display(),
                    "completed job is missing its output artifact"
                );
            }
            Err(error) => {
                summary.errors += 1;
                tracing::warn!(
                    event = JobEvent::SweepItemFailed.as_str(),
                    phase = "jobs",
                    job_id = job.job_id(),
                    error = %error,
                    "failed to check output artifact"
                );
            }
        }
    }

    async fn reclaim_aged_artifacts(&self, summary: &mut SweepSummary) {
        let scan = self.artifacts.scan().await;
        summary.errors += scan.failures as u64;
        let now = SystemTime::now();
        for entry in scan.entries {
            if entry.age(now) > self.retention {
                self.delete_artifact(&entry.path, summary).await;
            }
        }
    }

    async fn delete_artifact(&self, path: &Path, summary: &mut SweepSummary) {
        match self.artifacts.delete(path).await {
            Ok(DeleteOutcome::Deleted) => {
                summary.files_deleted += 1;
                tracing::debug!(
                    event = JobEvent::SweepArtifactReclaimed.as_str(),
                    path = %path.display(),
                    "artifact reclaimed"
                );
            }
            Ok(DeleteOutcome::Missing) => {}
            Err(error) => {
                summary.errors += 1;
                tracing::warn!(
                    event = JobEvent::SweepItemFailed.as_str(),
                    phase = "artifacts",
                    path = %path.display(),
                    error = %error,
                    "failed to delete artifact"
                );
            }
        }
    }
}
