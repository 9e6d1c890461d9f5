//! Job state store: one record per job, with native per-key expiry.
//!
//! The store TTL is the single source of truth for a job's remaining
//! lifetime. Status updates go through [`JobStateStore::update_keep_ttl`],
//! which never extends that lifetime and never recreates a vanished key.

mod memory;
mod valkey;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateStoreError;
use crate::jobs::{Job, JobTransition};
use crate::observability::JobEvent;

pub use memory::MemoryJobStateStore;
pub use valkey::ValkeyJobStateStore;

/// Default key namespace for job records.
pub const DEFAULT_JOB_KEY_PREFIX: &str = "omni-convert:job";

/// What the store currently holds under one job key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredRecord {
    /// No record (never existed, or evicted by the store).
    Gone,
    /// Record still present but its remaining TTL is zero, or it has no TTL at all.
    Expired(Job),
    /// Record alive with this much time left.
    Live {
        /// Stored record.
        job: Job,
        /// Remaining time-to-expiry.
        remaining: Duration,
    },
}

impl StoredRecord {
    /// Record and remaining lifetime, only when still alive.
    pub fn live(self) -> Option<(Job, Duration)> {
        match self {
            Self::Live { job, remaining } => Some((job, remaining)),
            Self::Gone | Self::Expired(_) => None,
        }
    }
}

/// Key-value backing store for job records.
#[async_trait]
pub trait JobStateStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Establish the backend connection eagerly.
    async fn connect(&self) -> Result<(), StateStoreError> {
        Ok(())
    }

    /// Release the backend connection.
    async fn disconnect(&self) -> Result<(), StateStoreError> {
        Ok(())
    }

    /// Write a brand-new record with the given TTL. Fails if the key exists.
    async fn insert_new(&self, job: &Job, ttl: Duration) -> Result<(), StateStoreError>;

    /// Fetch a record together with its remaining TTL.
    async fn inspect(&self, job_id: &str) -> Result<StoredRecord, StateStoreError>;

    /// Overwrite a live record, keeping whatever TTL remains.
    ///
    /// Returns `false` when the key no longer exists; nothing is written then.
    async fn update_keep_ttl(&self, transition: &JobTransition) -> Result<bool, StateStoreError>;

    /// Delete a record. Returns `true` when something was removed.
    async fn delete(&self, job_id: &str) -> Result<bool, StateStoreError>;

    /// Enumerate job ids currently held by the store.
    async fn list_job_ids(&self) -> Result<Vec<String>, StateStoreError>;
}

/// Backend selection for the job state store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateStoreBackend {
    /// In-process map with per-key deadlines (single process only).
    Memory,
    /// Valkey/Redis key-value store with native TTL.
    Valkey {
        /// Valkey URL using Redis protocol (for example `redis://127.0.0.1:6379/0`).
        url: String,
        /// Key namespace prefix.
        key_prefix: String,
    },
}

/// Runtime config for the job state store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStoreConfig {
    /// Backend mode.
    pub backend: StateStoreBackend,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            backend: StateStoreBackend::Memory,
        }
    }
}

impl StateStoreConfig {
    /// Return a sanitized config with safe defaults.
    pub fn normalized(mut self) -> Self {
        if let StateStoreBackend::Valkey { key_prefix, .. } = &mut self.backend
            && key_prefix.trim().is_empty()
        {
            *key_prefix = DEFAULT_JOB_KEY_PREFIX.to_string();
        }
        self
    }

    /// Build a store client from this config. Does not connect.
    pub fn build_store(&self) -> Result<Arc<dyn JobStateStore>, StateStoreError> {
        let normalized = self.clone().normalized();
        match normalized.backend {
            StateStoreBackend::Memory => {
                tracing::info!(
                    event = JobEvent::StateStoreInitialized.as_str(),
                    backend = "memory",
                    "job state store initialized"
                );
                Ok(Arc::new(MemoryJobStateStore::new()))
            }
            StateStoreBackend::Valkey { url, key_prefix } => {
                tracing::info!(
                    event = JobEvent::StateStoreInitialized.as_str(),
                    backend = "valkey",
                    key_prefix = %key_prefix,
                    "job state store initialized"
                );
                Ok(Arc::new(ValkeyJobStateStore::new(&url, key_prefix)?))
            }
        }
    }

    /// Human-readable backend name for logs.
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            StateStoreBackend::Memory => "memory",
            StateStoreBackend::Valkey { .. } => "valkey",
        }
    }
}
