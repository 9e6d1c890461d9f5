//! Stable event names attached to tracing records as `event = ...`.

/// Structured event identifiers for job, store and sweep logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    StateStoreInitialized,
    StateStoreConnected,
    StateStoreDisconnected,
    StateStoreCommandRetrySucceeded,
    StateStoreCommandRetryFailed,
    ArtifactAreasReady,
    JobCreated,
    JobConversionStarted,
    JobCompleted,
    JobFailed,
    JobOutcomeDropped,
    JobLookupMiss,
    ArtifactServed,
    ArtifactMissing,
    SweepStarted,
    SweepSkipped,
    SweepJobReclaimed,
    SweepArtifactReclaimed,
    SweepInconsistentJob,
    SweepItemFailed,
    SweepFinished,
    SchedulerStarted,
    SchedulerStopped,
}

impl JobEvent {
    /// Dotted event name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StateStoreInitialized => "state_store.initialized",
            Self::StateStoreConnected => "state_store.connected",
            Self::StateStoreDisconnected => "state_store.disconnected",
            Self::StateStoreCommandRetrySucceeded => "state_store.command.retry_succeeded",
            Self::StateStoreCommandRetryFailed => "state_store.command.retry_failed",
            Self::ArtifactAreasReady => "artifacts.areas_ready",
            Self::JobCreated => "job.created",
            Self::JobConversionStarted => "job.conversion.started",
            Self::JobCompleted => "job.completed",
            Self::JobFailed => "job.failed",
            Self::JobOutcomeDropped => "job.outcome.dropped",
            Self::JobLookupMiss => "job.lookup.miss",
            Self::ArtifactServed => "job.artifact.served",
            Self::ArtifactMissing => "job.artifact.missing",
            Self::SweepStarted => "sweep.started",
            Self::SweepSkipped => "sweep.skipped",
            Self::SweepJobReclaimed => "sweep.job.reclaimed",
            Self::SweepArtifactReclaimed => "sweep.artifact.reclaimed",
            Self::SweepInconsistentJob => "sweep.job.inconsistent",
            Self::SweepItemFailed => "sweep.item.failed",
            Self::SweepFinished => "sweep.finished",
            Self::SchedulerStarted => "sweep.scheduler.started",
            Self::SchedulerStopped => "sweep.scheduler.stopped",
        }
    }
}
