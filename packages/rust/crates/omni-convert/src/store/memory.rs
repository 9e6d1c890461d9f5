use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::StateStoreError;
use crate::jobs::{Job, JobTransition};

use super::{JobStateStore, StoredRecord};

struct Entry {
    job: Job,
    deadline: Instant,
}

/// In-memory job state store (single process only).
///
/// Deadlines use the tokio clock. Expired entries are kept and reported as
/// [`StoredRecord::Expired`] until deleted, so a sweep can still reclaim the
/// artifacts they reference.
#[derive(Default)]
pub struct MemoryJobStateStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryJobStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the store holds no entries at all.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl JobStateStore for MemoryJobStateStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert_new(&self, job: &Job, ttl: Duration) -> Result<(), StateStoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(job.job_id())
            && existing.deadline > now
        {
            return Err(StateStoreError::Duplicate {
                job_id: job.job_id().to_string(),
            });
        }
        entries.insert(
            job.job_id().to_string(),
            Entry {
                job: job.clone(),
                deadline: now + ttl,
            },
        );
        Ok(())
    }

    async fn inspect(&self, job_id: &str) -> Result<StoredRecord, StateStoreError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let Some(entry) = entries.get(job_id) else {
            return Ok(StoredRecord::Gone);
        };
        let remaining = entry.deadline.saturating_duration_since(now);
        if remaining.is_zero() {
            return Ok(StoredRecord::Expired(entry.job.clone()));
        }
        Ok(StoredRecord::Live {
            job: entry.job.clone(),
            remaining,
        })
    }

    async fn update_keep_ttl(&self, transition: &JobTransition) -> Result<bool, StateStoreError> {
        let now = Instant::now();
        let job = transition.job();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(job.job_id()) {
            Some(entry) if entry.deadline > now => {
                entry.job = job.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, job_id: &str) -> Result<bool, StateStoreError> {
        Ok(self.entries.lock().await.remove(job_id).is_some())
    }

    async fn list_job_ids(&self) -> Result<Vec<String>, StateStoreError> {
        let mut ids: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
