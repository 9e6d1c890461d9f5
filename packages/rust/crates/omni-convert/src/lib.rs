//! Ephemeral conversion jobs: upload an STL mesh, convert it to STEP, fetch the result.
//!
//! - **Lifecycle**: each job is a record in a TTL-bound state store (memory or Valkey);
//!   status changes keep the remaining TTL and never revive an expired record.
//! - **Sweeper**: a scheduled reconciliation pass reclaims expired records together with
//!   their files, plus any artifact older than the retention window.

#![allow(missing_docs)]

mod artifacts;
mod config;
mod convert;
mod error;
mod jobs;
mod lifecycle;
mod observability;
mod runtime;
mod store;
mod sweeper;

pub use artifacts::{
    ArtifactArea, ArtifactEntry, ArtifactMetadata, ArtifactScan, ArtifactStore, DeleteOutcome,
    LocalArtifactStore, UploadRejected, output_filename_for, stored_upload_name, validate_upload,
};
pub use config::{
    ConvertConfig, ConverterSettings, JobsSettings, RuntimeSettings, StateStoreSettings,
    StorageConfig, StorageSettings, load_runtime_settings, load_runtime_settings_from_paths,
    runtime_settings_paths, set_config_home_override,
};
pub use convert::{Converter, FreecadConverter, FreecadConverterConfig};
pub use error::{ConversionError, JobError, JobErrorKind, StateStoreError};
pub use jobs::{Job, JobState, JobStatus, JobStatusReport, JobTransition, JobView, NewJob};
pub use lifecycle::{
    ArtifactDownload, DEFAULT_CONVERSION_TIMEOUT_SECS, DEFAULT_RETENTION_SECS,
    JobLifecycleManager, LifecycleConfig,
};
pub use observability::JobEvent;
pub use runtime::ConvertRuntime;
pub use store::{
    DEFAULT_JOB_KEY_PREFIX, JobStateStore, MemoryJobStateStore, StateStoreBackend,
    StateStoreConfig, StoredRecord, ValkeyJobStateStore,
};
pub use sweeper::{
    DEFAULT_SWEEP_SCHEDULE, InvalidSweepSchedule, SweepRun, SweepSchedule, SweepSummary, Sweeper,
    SweeperHandle, SweeperStats, spawn_scheduled_sweeps,
};
