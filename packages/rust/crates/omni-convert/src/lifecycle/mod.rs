//! Job lifecycle manager: create, convert, look up, and serve artifacts.
//!
//! The manager is the only writer of job records during normal operation.
//! Every status change goes through a [`JobTransition`] and is applied with
//! [`JobStateStore::update_keep_ttl`], so an update can only shrink or keep
//! the remaining lifetime.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::convert::Converter;
use crate::error::{ConversionError, JobError};
use crate::jobs::{Job, JobStatus, JobTransition, JobView, NewJob};
use crate::observability::JobEvent;
use crate::store::JobStateStore;

/// Default lifetime of a job record and its artifacts.
pub const DEFAULT_RETENTION_SECS: u64 = 3600;
/// Default bound on one converter call.
pub const DEFAULT_CONVERSION_TIMEOUT_SECS: u64 = 300;

/// Timing knobs for [`JobLifecycleManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// TTL given to every new job record.
    pub retention: Duration,
    /// Upper bound on one converter call.
    pub conversion_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            conversion_timeout: Duration::from_secs(DEFAULT_CONVERSION_TIMEOUT_SECS),
        }
    }
}

/// A completed artifact ready to stream to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDownload {
    pub job_id: String,
    /// Output file on the artifact store.
    pub path: PathBuf,
    /// Name to offer the client.
    pub filename: String,
    pub size_bytes: u64,
}

/// Orchestrates job records, the converter and artifact checks.
pub struct JobLifecycleManager {
    store: Arc<dyn JobStateStore>,
    artifacts: Arc<dyn ArtifactStore>,
    converter: Arc<dyn Converter>,
    retention: Duration,
    conversion_timeout: Duration,
}

impl JobLifecycleManager {
    pub fn new(
        store: Arc<dyn JobStateStore>,
        artifacts: Arc<dyn ArtifactStore>,
        converter: Arc<dyn Converter>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            artifacts,
            converter,
            retention: config.retention.max(Duration::from_secs(1)),
            conversion_timeout: config.conversion_timeout.max(Duration::from_secs(1)),
        }
    }

    /// Retention window applied to new jobs.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Allocate a job id and write a `processing` record with TTL = retention.
    pub async fn create_job(&self, request: NewJob) -> Result<Job, JobError> {
        let job = Job::new(Uuid::new_v4().to_string(), request, Utc::now(), self.retention);
        self.store.insert_new(&job, self.retention).await?;
        tracing::info!(
            event = JobEvent::JobCreated.as_str(),
            job_id = job.job_id(),
            backend = self.store.backend_name(),
            ttl_secs = self.retention.as_secs(),
            original_filename = job.original_filename(),
            "conversion job created"
        );
        Ok(job)
    }

    /// Run the converter for a `processing` job and record the outcome.
    ///
    /// Returns the `completed` record, or [`JobError::Conversion`] after the
    /// job has been recorded as `failed`. When the record vanished while the
    /// converter ran, nothing is written and the job reads as not found.
    pub async fn run_conversion(&self, job: &Job) -> Result<Job, JobError> {
        if job.status() != JobStatus::Processing {
            return Err(JobError::InvalidTransition {
                job_id: job.job_id().to_string(),
                status: job.status().as_str(),
            });
        }
        tracing::debug!(
            event = JobEvent::JobConversionStarted.as_str(),
            job_id = job.job_id(),
            input = %job.input_path().display(),
            output = %job.output_path().display(),
            timeout_secs = self.conversion_timeout.as_secs(),
            "conversion started"
        );

        let outcome = match tokio::time::timeout(
            self.conversion_timeout,
            self.converter.convert(job.input_path(), job.output_path()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ConversionError::TimedOut {
                timeout_secs: self.conversion_timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(()) => {
                let transition = job.complete(Utc::now())?;
                if !self.record(&transition).await? {
                    return Err(JobError::not_found(job.job_id()));
                }
                tracing::info!(
                    event = JobEvent::JobCompleted.as_str(),
                    job_id = job.job_id(),
                    "conversion completed"
                );
                Ok(transition.into_job())
            }
            Err(error) => {
                let transition = job.fail(error.to_string())?;
                let persisted = self.record(&transition).await?;
                tracing::warn!(
                    event = JobEvent::JobFailed.as_str(),
                    job_id = job.job_id(),
                    persisted,
                    error = %error,
                    "conversion failed"
                );
                Err(JobError::Conversion(error))
            }
        }
    }

    /// Create a job and run its conversion.
    pub async fn submit(&self, request: NewJob) -> Result<Job, JobError> {
        let job = self.create_job(request).await?;
        self.run_conversion(&job).await
    }

    /// Live record plus remaining time-to-expiry.
    ///
    /// Never-existed and expired jobs both yield [`JobError::NotFound`].
    pub async fn get_job(&self, job_id: &str) -> Result<JobView, JobError> {
        match self.store.inspect(job_id).await?.live() {
            Some((job, expires_in)) => Ok(JobView { job, expires_in }),
            None => {
                tracing::debug!(
                    event = JobEvent::JobLookupMiss.as_str(),
                    job_id,
                    "job not found or expired"
                );
                Err(JobError::not_found(job_id))
            }
        }
    }

    /// Resolve the artifact of a `completed` job for download.
    ///
    /// Record and file are checked independently: an expired record is
    /// [`JobError::NotFound`], a live non-completed job is
    /// [`JobError::NotCompleted`], and a completed job without its file is
    /// [`JobError::ArtifactMissing`].
    pub async fn retrieve_artifact(&self, job_id: &str) -> Result<ArtifactDownload, JobError> {
        let JobView { job, .. } = self.get_job(job_id).await?;
        if job.status() != JobStatus::Completed {
            return Err(JobError::NotCompleted {
                job_id: job_id.to_string(),
                status: job.status().as_str(),
            });
        }
        let path = job.output_path().to_path_buf();
        let metadata = self
            .artifacts
            .metadata(&path)
            .await
            .map_err(|source| JobError::ArtifactStore {
                path: path.clone(),
                source,
            })?;
        let Some(metadata) = metadata else {
            tracing::warn!(
                event = JobEvent::ArtifactMissing.as_str(),
                job_id,
                path = %path.display(),
                "completed job has no output artifact"
            );
            return Err(JobError::ArtifactMissing {
                job_id: job_id.to_string(),
                path,
            });
        };
        tracing::debug!(
            event = JobEvent::ArtifactServed.as_str(),
            job_id,
            size_bytes = metadata.size_bytes,
            "artifact resolved for download"
        );
        Ok(ArtifactDownload {
            job_id: job_id.to_string(),
            path,
            filename: job.output_filename().to_string(),
            size_bytes: metadata.size_bytes,
        })
    }

    async fn record(&self, transition: &JobTransition) -> Result<bool, JobError> {
        let persisted = self.store.update_keep_ttl(transition).await?;
        if !persisted {
            tracing::warn!(
                event = JobEvent::JobOutcomeDropped.as_str(),
                job_id = transition.job().job_id(),
                status = %transition.job().status(),
                "job record expired before its outcome was recorded"
            );
        }
        Ok(persisted)
    }
}
