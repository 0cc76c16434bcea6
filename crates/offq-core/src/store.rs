//! JobStore: whole-snapshot persistence of the job list.
//!
//! The entire list is serialized as one JSON array under one key and
//! overwritten on every save.

use std::sync::Arc;

use crate::domain::Job;
use crate::error::QueueError;
use crate::ports::KeyValueStore;

pub const DEFAULT_STORAGE_KEY: &str = "offline_queue";

#[derive(Clone)]
pub struct JobStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl JobStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the persisted snapshot in stored order.
    ///
    /// Never fails: a missing, unreadable or corrupt snapshot yields an empty
    /// queue. Losing queued jobs is acceptable, an unusable queue is not.
    pub async fn load(&self) -> Vec<Job> {
        let raw = match self.kv.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "failed to read queue snapshot; starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Job>>(&raw) {
            Ok(jobs) => {
                tracing::debug!(key = %self.key, jobs = jobs.len(), "queue snapshot loaded");
                jobs
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "corrupt queue snapshot; starting empty");
                Vec::new()
            }
        }
    }

    /// Overwrite the persisted snapshot with `jobs`.
    pub async fn save(&self, jobs: &[Job]) -> Result<(), QueueError> {
        let raw = serde_json::to_string(jobs)?;
        self.kv.set(&self.key, raw).await
    }
}
