//! Job record and its state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;

/// Opaque key/value payload. Only the matching handler interprets it.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Kind of job (e.g. `sync_contacts`). Selects the handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobType(String);

impl JobType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JobType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job status.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Pending (retry, loop until max_retries)
/// - Pending -> Processing -> Failed
/// - Failed -> Pending (only via explicit `retry_failed`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and Failed do not move on their own.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Eligible for selection by a processing pass.
    pub fn is_runnable(self) -> bool {
        matches!(self, JobStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued unit of deferred, retryable work.
///
/// Status and retry fields change only through the methods below; the queue
/// processor is the only caller of the transition methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    #[serde(default)]
    pub payload: Payload,
    pub status: JobStatus,

    /// Failed attempts so far.
    pub retry_count: u32,

    /// Retry budget, fixed at enqueue time.
    pub max_retries: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        id: JobId,
        job_type: JobType,
        payload: Payload,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_type,
            payload,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending -> Processing.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.updated_at = now;
    }

    /// Processing -> Completed.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.updated_at = now;
    }

    /// Record a failed attempt. Status is decided separately by the retry policy.
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.updated_at = now;
    }

    /// Processing -> Failed, keeping the recorded error.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.updated_at = now;
    }

    /// Processing -> Failed with an overriding reason.
    pub fn fail_with(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.last_error = Some(reason.into());
        self.mark_failed(now);
    }

    /// Processing -> Pending, waiting for the next pass.
    pub fn requeue(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.updated_at = now;
    }

    /// Failed -> Pending with a fresh retry budget.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.retry_count = 0;
        self.last_error = None;
        self.updated_at = now;
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}
