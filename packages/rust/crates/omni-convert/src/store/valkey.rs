//! Valkey/Redis-backed job state store (multi-node safe).
//!
//! Key layout: `<prefix>:<job_id>` holding the JSON record, with a native TTL.
//! Status updates use `SET ... XX KEEPTTL`: one atomic command that keeps the
//! remaining TTL and does nothing once the key has expired.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::FromRedisValue;
use tokio::sync::Mutex;

use crate::error::StateStoreError;
use crate::jobs::{Job, JobTransition};
use crate::observability::JobEvent;

use super::{JobStateStore, StoredRecord};

const SCAN_BATCH: usize = 200;
/// Upper bound on dialing; the connection lock is held meanwhile.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-protocol job state store.
pub struct ValkeyJobStateStore {
    client: redis::Client,
    key_prefix: String,
    connection: Arc<Mutex<Option<redis::aio::MultiplexedConnection>>>,
}

impl ValkeyJobStateStore {
    /// Create a client for `url`. The connection is opened lazily or by `connect`.
    pub fn new(url: &str, key_prefix: impl Into<String>) -> Result<Self, StateStoreError> {
        let client = redis::Client::open(url).map_err(|error| StateStoreError::Unavailable {
            operation: "open_client",
            message: format!("invalid valkey url for job state store: {url}: {error}"),
        })?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            connection: Arc::new(Mutex::new(None)),
        })
    }

    fn job_key(&self, job_id: &str) -> String {
        format!("{}:{job_id}", self.key_prefix)
    }

    fn job_id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.key_prefix.as_str())?
            .strip_prefix(':')
            .filter(|id| !id.is_empty())
    }

    async fn ensure_connection(
        &self,
        connection: &mut Option<redis::aio::MultiplexedConnection>,
    ) -> Result<(), StateStoreError> {
        if connection.is_some() {
            return Ok(());
        }
        let dialed = tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            StateStoreError::unavailable(
                "connect",
                format!("no connection within {}s", CONNECT_TIMEOUT.as_secs()),
            )
        })?
        .map_err(|error| StateStoreError::unavailable("connect", error))?;
        *connection = Some(dialed);
        tracing::debug!(
            event = JobEvent::StateStoreConnected.as_str(),
            backend = "valkey",
            key_prefix = %self.key_prefix,
            "job state store connected to valkey"
        );
        Ok(())
    }

    /// Clone of the shared multiplexed connection; the lock is released before any command runs.
    async fn shared_connection(
        &self,
        operation: &'static str,
    ) -> Result<redis::aio::MultiplexedConnection, StateStoreError> {
        let mut conn_guard = self.connection.lock().await;
        self.ensure_connection(&mut conn_guard).await?;
        conn_guard
            .clone()
            .ok_or_else(|| StateStoreError::unavailable(operation, "connection unavailable"))
    }

    async fn reset_connection(&self) {
        // Drop stale connection so next attempt uses a fresh socket.
        *self.connection.lock().await = None;
    }

    async fn run_command<T, F>(
        &self,
        operation: &'static str,
        build: F,
    ) -> Result<T, StateStoreError>
    where
        T: FromRedisValue + Send,
        F: Fn() -> redis::Cmd,
    {
        // Try once with the current connection, then reconnect and retry once.
        let mut last_err: Option<StateStoreError> = None;
        for attempt in 0..2 {
            let mut conn = self.shared_connection(operation).await?;
            let cmd = build();
            let result: redis::RedisResult<T> = cmd.query_async(&mut conn).await;
            match result {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            event = JobEvent::StateStoreCommandRetrySucceeded.as_str(),
                            operation,
                            attempt = attempt + 1,
                            "valkey command succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    tracing::warn!(
                        event = JobEvent::StateStoreCommandRetryFailed.as_str(),
                        operation,
                        attempt = attempt + 1,
                        error = %err,
                        "valkey command attempt failed; reconnecting"
                    );
                    self.reset_connection().await;
                    last_err = Some(StateStoreError::unavailable(operation, err));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| StateStoreError::unavailable(operation, "unknown failure")))
    }

    async fn run_pipeline<T, F>(
        &self,
        operation: &'static str,
        build: F,
    ) -> Result<T, StateStoreError>
    where
        T: FromRedisValue + Send,
        F: Fn() -> redis::Pipeline,
    {
        let mut last_err: Option<StateStoreError> = None;
        for attempt in 0..2 {
            let mut conn = self.shared_connection(operation).await?;
            let pipe = build();
            let result: redis::RedisResult<T> = pipe.query_async(&mut conn).await;
            match result {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            event = JobEvent::StateStoreCommandRetrySucceeded.as_str(),
                            operation,
                            attempt = attempt + 1,
                            "valkey pipeline succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    tracing::warn!(
                        event = JobEvent::StateStoreCommandRetryFailed.as_str(),
                        operation,
                        attempt = attempt + 1,
                        error = %err,
                        "valkey pipeline attempt failed; reconnecting"
                    );
                    self.reset_connection().await;
                    last_err = Some(StateStoreError::unavailable(operation, err));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| StateStoreError::unavailable(operation, "unknown failure")))
    }

    fn encode(job: &Job) -> Result<String, StateStoreError> {
        serde_json::to_string(job).map_err(|error| StateStoreError::Corrupt {
            job_id: job.job_id().to_string(),
            message: error.to_string(),
        })
    }

    fn decode(job_id: &str, payload: &str) -> Result<Job, StateStoreError> {
        serde_json::from_str(payload).map_err(|error| StateStoreError::Corrupt {
            job_id: job_id.to_string(),
            message: error.to_string(),
        })
    }
}

#[async_trait]
impl JobStateStore for ValkeyJobStateStore {
    fn backend_name(&self) -> &'static str {
        "valkey"
    }

    async fn connect(&self) -> Result<(), StateStoreError> {
        let _: String = self.run_command("ping", || redis::cmd("PING")).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StateStoreError> {
        let dropped = self.connection.lock().await.take().is_some();
        tracing::debug!(
            event = JobEvent::StateStoreDisconnected.as_str(),
            backend = "valkey",
            dropped,
            "job state store disconnected from valkey"
        );
        Ok(())
    }

    async fn insert_new(&self, job: &Job, ttl: Duration) -> Result<(), StateStoreError> {
        let key = self.job_key(job.job_id());
        let payload = Self::encode(job)?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let written: Option<String> = self
            .run_command("insert_new", || {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&key)
                    .arg(&payload)
                    .arg("PX")
                    .arg(ttl_ms)
                    .arg("NX");
                cmd
            })
            .await?;
        if written.is_none() {
            return Err(StateStoreError::Duplicate {
                job_id: job.job_id().to_string(),
            });
        }
        Ok(())
    }

    async fn inspect(&self, job_id: &str) -> Result<StoredRecord, StateStoreError> {
        let key = self.job_key(job_id);
        let (payload, pttl): (Option<String>, i64) = self
            .run_pipeline("inspect", || {
                let mut pipe = redis::pipe();
                pipe.atomic();
                pipe.cmd("GET").arg(&key);
                pipe.cmd("PTTL").arg(&key);
                pipe
            })
            .await?;
        let Some(payload) = payload else {
            return Ok(StoredRecord::Gone);
        };
        let job = Self::decode(job_id, &payload)?;
        // PTTL: -2 missing, -1 no expiry. A record without TTL is treated as expired.
        match u64::try_from(pttl) {
            Ok(ms) if ms > 0 => Ok(StoredRecord::Live {
                job,
                remaining: Duration::from_millis(ms),
            }),
            _ => Ok(StoredRecord::Expired(job)),
        }
    }

    async fn update_keep_ttl(&self, transition: &JobTransition) -> Result<bool, StateStoreError> {
        let job = transition.job();
        let key = self.job_key(job.job_id());
        let payload = Self::encode(job)?;
        let written: Option<String> = self
            .run_command("update_keep_ttl", || {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&key).arg(&payload).arg("XX").arg("KEEPTTL");
                cmd
            })
            .await?;
        Ok(written.is_some())
    }

    async fn delete(&self, job_id: &str) -> Result<bool, StateStoreError> {
        let key = self.job_key(job_id);
        let removed: i64 = self
            .run_command("delete", || {
                let mut cmd = redis::cmd("DEL");
                cmd.arg(&key);
                cmd
            })
            .await?;
        Ok(removed > 0)
    }

    async fn list_job_ids(&self) -> Result<Vec<String>, StateStoreError> {
        let pattern = format!("{}:*", self.key_prefix);
        let mut ids = BTreeSet::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = self
                .run_command("list_job_ids", || {
                    let mut cmd = redis::cmd("SCAN");
                    cmd.arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH);
                    cmd
                })
                .await?;
            // SCAN may return a key more than once across iterations.
            ids.extend(
                keys.iter()
                    .filter_map(|key| self.job_id_from_key(key))
                    .map(str::to_string),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_recovered_from_prefixed_keys() {
        let store = ValkeyJobStateStore::new("redis://127.0.0.1:6379/0", "omni-convert:job")
            .expect("valid url");
        assert_eq!(store.job_key("abc"), "omni-convert:job:abc");
        assert_eq!(store.job_id_from_key("omni-convert:job:abc"), Some("abc"));
        assert_eq!(store.job_id_from_key("omni-convert:job:"), None);
        assert_eq!(store.job_id_from_key("other:job:abc"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_gives_up_when_the_server_never_answers() {
        // Accepts TCP but never replies, so the SELECT handshake hangs.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind silent listener");
        let addr = listener.local_addr().expect("listener addr");
        let store = ValkeyJobStateStore::new(&format!("redis://{addr}/1"), "omni-convert:job")
            .expect("valid url");

        let err = store.connect().await.expect_err("silent server");
        match err {
            StateStoreError::Unavailable { operation, message } => {
                assert_eq!(operation, "connect");
                assert!(message.contains("no connection within"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        drop(listener);
    }
}
