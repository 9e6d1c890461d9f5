use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

use crate::observability::JobEvent;

use super::{SweepRun, Sweeper};

/// Default sweep cadence (crontab syntax): every 15 minutes.
pub const DEFAULT_SWEEP_SCHEDULE: &str = "*/15 * * * *";

/// Cron expression that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid sweep schedule `{expression}`: {message}")]
pub struct InvalidSweepSchedule {
    pub expression: String,
    pub message: String,
}

/// Cron schedule for recurring sweeps.
///
/// Accepts 5-field crontab expressions (minute resolution) and the 6/7-field
/// form with a leading seconds field.
#[derive(Debug, Clone)]
pub struct SweepSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl SweepSchedule {
    pub fn parse(expression: &str) -> Result<Self, InvalidSweepSchedule> {
        let trimmed = expression.trim();
        let normalized = if trimmed.split_whitespace().count() == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_string()
        };
        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|error| InvalidSweepSchedule {
                expression: trimmed.to_string(),
                message: error.to_string(),
            })?;
        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
        })
    }

    /// Expression as configured.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Time from `now` until the next fire time.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        let next = self.schedule.after(&now).next()?;
        Some((next - now).to_std().unwrap_or_default())
    }
}

/// Running scheduler task. Dropping the handle stops future ticks.
pub struct SweeperHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop scheduling and wait for an in-flight pass to finish.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(error) = task.await
        {
            tracing::error!("sweep scheduler task crashed: {error}");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

/// Spawn a task that runs [`Sweeper::try_sweep`] at every fire time of `schedule`.
///
/// Each tick spawns its pass; a tick that lands while a pass is still running
/// is skipped by the sweeper's run-lock.
pub fn spawn_scheduled_sweeps(sweeper: Arc<Sweeper>, schedule: SweepSchedule) -> SweeperHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        tracing::info!(
            event = JobEvent::SchedulerStarted.as_str(),
            schedule = schedule.expression(),
            "starting cleanup scheduler"
        );
        let mut passes = JoinSet::new();
        loop {
            let Some(delay) = schedule.next_delay(Utc::now()) else {
                tracing::warn!(
                    schedule = schedule.expression(),
                    "sweep schedule has no upcoming fire time"
                );
                break;
            };
            tokio::select! {
                _ = &mut stop_rx => break,
                () = tokio::time::sleep(delay) => {
                    let sweeper = Arc::clone(&sweeper);
                    passes.spawn(async move {
                        if let SweepRun::Completed(summary) = sweeper.try_sweep().await {
                            tracing::debug!(?summary, "scheduled sweep finished");
                        }
                    });
                }
            }
            while let Some(result) = passes.try_join_next() {
                if let Err(error) = result {
                    tracing::error!("scheduled sweep crashed: {error}");
                }
            }
        }
        while let Some(result) = passes.join_next().await {
            if let Err(error) = result {
                tracing::error!("scheduled sweep crashed: {error}");
            }
        }
        tracing::info!(
            event = JobEvent::SchedulerStopped.as_str(),
            "cleanup scheduler stopped"
        );
    });
    SweeperHandle {
        stop_tx: Some(stop_tx),
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_crontab_is_accepted() {
        let schedule = SweepSchedule::parse("*/15 * * * *").expect("valid crontab");
        let now = DateTime::parse_from_rfc3339("2026-01-01T10:07:30Z")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        assert_eq!(schedule.next_delay(now), Some(Duration::from_secs(7 * 60 + 30)));
    }

    #[test]
    fn seconds_field_form_is_accepted() {
        let schedule = SweepSchedule::parse("*/5 * * * * *").expect("valid cron");
        let now = DateTime::parse_from_rfc3339("2026-01-01T10:00:01Z")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        assert_eq!(schedule.next_delay(now), Some(Duration::from_secs(4)));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = SweepSchedule::parse("every fifteen minutes").unwrap_err();
        assert_eq!(err.expression, "every fifteen minutes");
    }

    #[test]
    fn default_fires_every_quarter_hour() {
        let schedule = SweepSchedule::parse(DEFAULT_SWEEP_SCHEDULE).expect("default is valid");
        let now = DateTime::parse_from_rfc3339("2026-01-01T10:15:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        assert_eq!(schedule.next_delay(now), Some(Duration::from_secs(15 * 60)));
    }
}
