//! Status views and tracing setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::domain::{Job, JobStatus};

/// Job counts by status, as returned by `OfflineQueue::get_status`.
///
/// Completed jobs are pruned at the end of each pass and are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
}

impl QueueStatus {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        jobs.into_iter()
            .fold(Self::default(), |mut status, job| {
                match job.status {
                    JobStatus::Pending => status.pending += 1,
                    JobStatus::Processing => status.processing += 1,
                    JobStatus::Failed => status.failed += 1,
                    JobStatus::Completed => {}
                }
                status
            })
    }

    /// Nothing left to do and nothing waiting for `retry_failed`.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
