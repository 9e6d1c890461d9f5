//! Client-facing status view of a live job.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::record::{Job, JobStatus};

/// A live job plus its remaining lifetime as reported by the state store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    /// The stored record.
    pub job: Job,
    /// Remaining time-to-expiry from the store's TTL.
    pub expires_in: Duration,
}

impl JobView {
    /// Serializable status report for transports.
    pub fn report(&self) -> JobStatusReport {
        JobStatusReport {
            job_id: self.job.job_id().to_string(),
            status: self.job.status(),
            original_filename: self.job.original_filename().to_string(),
            expires_in: whole_seconds(self.expires_in),
            expires_at: iso(self.job.expires_at()),
            created_at: iso(self.job.created_at()),
            completed_at: self.job.completed_at().map(iso),
            error: self.job.error().map(str::to_string),
        }
    }
}

/// Status response body (`expiresIn` rounded to whole seconds, timestamps ISO-8601).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub job_id: String,
    pub status: JobStatus,
    pub original_filename: String,
    pub expires_in: u64,
    pub expires_at: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Nearest whole second, the way the store's `TTL` reports it.
fn whole_seconds(remaining: Duration) -> u64 {
    u64::try_from(remaining.as_millis().saturating_add(500) / 1000).unwrap_or(u64::MAX)
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::jobs::NewJob;

    #[test]
    fn report_rounds_expiry_to_nearest_second() {
        let created_at =
            DateTime::<Utc>::from_timestamp_millis(0).expect("epoch is a valid timestamp");
        let job = Job::new(
            "job-r",
            NewJob {
                input_path: PathBuf::from("uploads/r.stl"),
                output_path: PathBuf::from("converted/r.step"),
                output_filename: "r.step".to_string(),
                original_filename: "bracket.stl".to_string(),
            },
            created_at,
            Duration::from_secs(3600),
        );
        let view = JobView {
            job,
            expires_in: Duration::from_millis(1_999),
        };
        let value = serde_json::to_value(view.report()).expect("serialize report");
        assert_eq!(value["expiresIn"], 2);
        assert_eq!(value["status"], "processing");
        assert_eq!(value["createdAt"], "1970-01-01T00:00:00.000Z");
        assert_eq!(value["expiresAt"], "1970-01-01T01:00:00.000Z");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn sub_second_remainders_round_half_up() {
        assert_eq!(whole_seconds(Duration::from_millis(1_499)), 1);
        assert_eq!(whole_seconds(Duration::from_millis(1_500)), 2);
        assert_eq!(whole_seconds(Duration::from_millis(300)), 0);
        assert_eq!(whole_seconds(Duration::ZERO), 0);
    }
}
