//! Job record, status state machine and persisted wire shape.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Status label of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Conversion in flight.
    Processing,
    /// Output artifact produced.
    Completed,
    /// Conversion failed or timed out.
    Failed,
}

impl JobStatus {
    /// Lowercase label used on the wire and in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus the data only that status carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobState {
    /// Initial state.
    Processing,
    /// Terminal success.
    Completed {
        /// When the converter returned successfully.
        #[serde(rename = "completedAt", with = "chrono::serde::ts_milliseconds")]
        completed_at: DateTime<Utc>,
    },
    /// Terminal failure.
    Failed {
        /// Converter error text, kept for diagnostics.
        error: String,
    },
}

impl JobState {
    /// Label for this state.
    pub const fn status(&self) -> JobStatus {
        match self {
            Self::Processing => JobStatus::Processing,
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Artifact identifiers supplied when a job is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    /// Uploaded file already placed in the upload area.
    pub input_path: PathBuf,
    /// Where the converter must write its output.
    pub output_path: PathBuf,
    /// File name offered to the downloader.
    pub output_filename: String,
    /// Name of the file as uploaded by the client.
    pub original_filename: String,
}

/// One tracked upload-to-result lifecycle.
///
/// Fields are private: a record is built by [`Job::new`] and changes only
/// through [`Job::complete`] / [`Job::fail`], which yield a [`JobTransition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    job_id: String,
    #[serde(flatten)]
    state: JobState,
    original_filename: String,
    input_path: PathBuf,
    output_path: PathBuf,
    output_filename: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    expires_at: DateTime<Utc>,
}

impl Job {
    /// Build a fresh `processing` record. `expires_at = created_at + retention`.
    pub fn new(
        job_id: impl Into<String>,
        request: NewJob,
        created_at: DateTime<Utc>,
        retention: Duration,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Processing,
            original_filename: request.original_filename,
            input_path: request.input_path,
            output_path: request.output_path,
            output_filename: request.output_filename,
            created_at,
            expires_at: expiry_for(created_at, retention),
        }
    }

    /// Opaque job id.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Current state including per-state data.
    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Current status label.
    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn output_filename(&self) -> &str {
        &self.output_filename
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Advisory expiry; the state store TTL is authoritative.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Completion time for `completed` jobs.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            JobState::Completed { completed_at } => Some(completed_at),
            _ => None,
        }
    }

    /// Error text for `failed` jobs.
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// `processing -> completed`.
    pub fn complete(&self, completed_at: DateTime<Utc>) -> Result<JobTransition, JobError> {
        self.transition(JobState::Completed { completed_at })
    }

    /// `processing -> failed`.
    pub fn fail(&self, error: impl Into<String>) -> Result<JobTransition, JobError> {
        self.transition(JobState::Failed {
            error: error.into(),
        })
    }

    fn transition(&self, next: JobState) -> Result<JobTransition, JobError> {
        if self.state != JobState::Processing {
            return Err(JobError::InvalidTransition {
                job_id: self.job_id.clone(),
                status: self.status().as_str(),
            });
        }
        let mut job = self.clone();
        job.state = next;
        Ok(JobTransition { job })
    }
}

/// A status change produced by a legal transition.
///
/// State stores only accept status changes in this form, and apply them
/// without touching the remaining TTL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTransition {
    job: Job,
}

impl JobTransition {
    /// The record after the transition.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Consume into the updated record.
    pub fn into_job(self) -> Job {
        self.job
    }
}

fn expiry_for(created_at: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(retention)
        .ok()
        .and_then(|delta| created_at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(retention: Duration) -> Job {
        let created_at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000)
            .expect("valid timestamp");
        Job::new(
            "job-1",
            NewJob {
                input_path: PathBuf::from("uploads/a.stl"),
                output_path: PathBuf::from("converted/a.step"),
                output_filename: "a.step".to_string(),
                original_filename: "part.stl".to_string(),
            },
            created_at,
            retention,
        )
    }

    #[test]
    fn expires_at_is_created_at_plus_retention() {
        let job = sample(Duration::from_secs(3600));
        assert_eq!(
            (job.expires_at() - job.created_at()).num_seconds(),
            3600,
            "advisory expiry must track the retention window"
        );
        assert_eq!(job.status(), JobStatus::Processing);
    }

    #[test]
    fn wire_shape_is_flat_camel_case() {
        let job = sample(Duration::from_secs(60));
        let done = job
            .complete(job.created_at() + TimeDelta::seconds(5))
            .expect("processing job can complete")
            .into_job();
        let value = serde_json::to_value(&done).expect("serialize");
        assert_eq!(value["jobId"], "job-1");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["originalFilename"], "part.stl");
        assert_eq!(value["outputFilename"], "a.step");
        assert_eq!(value["createdAt"], 1_700_000_000_000_i64);
        assert_eq!(value["expiresAt"], 1_700_000_060_000_i64);
        assert_eq!(value["completedAt"], 1_700_000_005_000_i64);
        assert!(value.get("error").is_none());

        let decoded: Job = serde_json::from_value(value).expect("deserialize");
        assert_eq!(decoded, done);
    }

    #[test]
    fn failed_record_carries_error_only() {
        let job = sample(Duration::from_secs(60));
        let failed = job.fail("mesh is not closed").expect("fail").into_job();
        let value = serde_json::to_value(&failed).expect("serialize");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "mesh is not closed");
        assert!(value.get("completedAt").is_none());
        assert_eq!(failed.error(), Some("mesh is not closed"));
        assert_eq!(failed.expires_at(), job.expires_at());
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let job = sample(Duration::from_secs(60));
        let failed = job.fail("boom").expect("fail").into_job();
        assert!(matches!(
            failed.complete(Utc::now()),
            Err(JobError::InvalidTransition { status: "failed", .. })
        ));
        let done = job.complete(Utc::now()).expect("complete").into_job();
        assert!(matches!(
            done.fail("late"),
            Err(JobError::InvalidTransition { status: "completed", .. })
        ));
    }
}
