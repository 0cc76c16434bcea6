//! OfflineQueue: the job list, its processing passes and the management API.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use super::retry::{RetryDecision, RetryPolicy, SessionRetries};
use super::timer::RetryTimer;
use crate::config::QueueConfig;
use crate::domain::{Job, JobId, JobStatus, JobType, Payload};
use crate::error::QueueError;
use crate::monitor::ConnectivityMonitor;
use crate::observability::QueueStatus;
use crate::ports::{Clock, ConnectivitySource, IdGenerator};
use crate::runtime::{HandlerRegistry, JobHandler};
use crate::store::JobStore;
use crate::typed::{TypedJob, TypedJobHandler};

/// Per-enqueue overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Overrides `QueueConfig::default_max_retries`.
    pub max_retries: Option<u32>,
}

impl EnqueueOptions {
    pub fn max_retries(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
        }
    }
}

/// Everything `OfflineQueue::open` needs. Assembled by the builder.
pub(crate) struct QueueParts {
    pub store: JobStore,
    pub connectivity: Arc<dyn ConnectivitySource>,
    pub handlers: HandlerRegistry,
    pub config: QueueConfig,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub monitor_connectivity: bool,
}

/// Persistent queue of deferred jobs, processed whenever the device is online.
///
/// Cheap to clone; all clones share the same queue.
///
/// - At most one processing pass runs at a time (`process_queue` is an
///   idempotent trigger).
/// - A pass handles the jobs that were pending when it started, one at a
///   time, in queue order.
/// - Failed attempts are retried with exponential backoff until the job's
///   `max_retries` or the session-wide retry cap is reached.
/// - Every state change is persisted before the next one happens.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<Inner>,
}

struct Inner {
    // never held across a handler call
    jobs: AsyncMutex<Vec<Job>>,
    store: JobStore,
    handlers: RwLock<HandlerRegistry>,
    connectivity: Arc<dyn ConnectivitySource>,
    policy: RetryPolicy,
    session: SessionRetries,
    processing: AtomicBool,
    timer: RetryTimer,
    monitor: Mutex<Option<ConnectivityMonitor>>,
    destroyed: AtomicBool,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

/// Holds the single-flight flag for the duration of a pass.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl OfflineQueue {
    /// Load the persisted snapshot and start the connectivity monitor.
    pub(crate) async fn open(parts: QueueParts) -> Self {
        let now = parts.clock.now();
        let mut jobs = parts.store.load().await;

        // A job left `processing` belongs to a pass that died with the process.
        let mut recovered = 0usize;
        for job in jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Processing)
        {
            job.requeue(now);
            recovered += 1;
        }
        if recovered > 0 {
            tracing::warn!(recovered, "interrupted jobs reset to pending");
            if let Err(e) = parts.store.save(&jobs).await {
                tracing::error!(error = %e, "failed to persist recovered queue snapshot");
            }
        }
        tracing::info!(
            jobs = jobs.len(),
            key = %parts.store.key(),
            "offline queue opened"
        );

        let queue = Self {
            inner: Arc::new(Inner {
                jobs: AsyncMutex::new(jobs),
                store: parts.store,
                handlers: RwLock::new(parts.handlers),
                connectivity: parts.connectivity,
                policy: RetryPolicy::from_config(&parts.config),
                session: SessionRetries::new(),
                processing: AtomicBool::new(false),
                timer: RetryTimer::new(),
                monitor: Mutex::new(None),
                destroyed: AtomicBool::new(false),
                config: parts.config,
                clock: parts.clock,
                ids: parts.ids,
            }),
        };

        if parts.monitor_connectivity {
            queue.start_monitor();
        }
        queue
    }

    fn start_monitor(&self) {
        let weak = Arc::downgrade(&self.inner);
        let monitor = ConnectivityMonitor::spawn(self.inner.connectivity.subscribe(), move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    OfflineQueue { inner }.process_queue().await;
                }
            }
        });
        *self.inner.monitor_slot() = Some(monitor);
    }

    /// Add a job with the default retry budget. Returns its id.
    pub async fn enqueue(&self, job_type: impl Into<JobType>, payload: Payload) -> JobId {
        self.enqueue_with(job_type, payload, EnqueueOptions::default())
            .await
    }

    pub async fn enqueue_with(
        &self,
        job_type: impl Into<JobType>,
        payload: Payload,
        opts: EnqueueOptions,
    ) -> JobId {
        let inner = &self.inner;
        let max_retries = opts.max_retries.unwrap_or(inner.config.default_max_retries);
        let job = Job::new(
            inner.ids.generate_job_id(),
            job_type.into(),
            payload,
            max_retries,
            inner.clock.now(),
        );
        let id = job.id;

        {
            let mut jobs = inner.jobs.lock().await;
            tracing::info!(job_id = %id, job_type = %job.job_type, max_retries, "job enqueued");
            jobs.push(job);
            inner.persist(&jobs).await;
        }

        if inner.config.process_on_enqueue {
            let queue = self.clone();
            tokio::spawn(async move {
                queue.process_queue().await;
            });
        }
        id
    }

    /// Enqueue a typed payload under `T::TYPE`.
    pub async fn enqueue_typed<T: TypedJob>(&self, payload: &T) -> Result<JobId, QueueError> {
        let payload = match serde_json::to_value(payload)? {
            serde_json::Value::Object(map) => map,
            other => return Err(QueueError::PayloadNotObject(value_kind(&other))),
        };
        Ok(self.enqueue(T::TYPE, payload).await)
    }

    /// Remove a job that is not currently being processed.
    ///
    /// Returns `false` if the job is unknown or its handler is running.
    pub async fn cancel(&self, id: JobId) -> bool {
        let mut jobs = self.inner.jobs.lock().await;
        let Some(pos) = jobs.iter().position(|j| j.id == id) else {
            return false;
        };
        if jobs[pos].status == JobStatus::Processing {
            tracing::debug!(job_id = %id, "cannot cancel a job that is processing");
            return false;
        }

        let job = jobs.remove(pos);
        tracing::info!(job_id = %id, job_type = %job.job_type, status = %job.status, "job cancelled");
        self.inner.persist(&jobs).await;
        true
    }

    /// Register (or replace) the handler for `job_type`.
    pub fn register_handler(&self, job_type: impl Into<JobType>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        tracing::debug!(job_type = %job_type, "handler registered");
        self.inner.handlers_mut().register(job_type, handler);
    }

    pub fn register_typed<T, H>(&self, handler: H)
    where
        T: TypedJob,
        H: TypedJobHandler<T> + 'static,
    {
        tracing::debug!(job_type = T::TYPE, "typed handler registered");
        self.inner.handlers_mut().register_typed::<T, H>(handler);
    }

    /// Returns `true` if a handler was removed. Pending jobs of that type stay
    /// queued until a handler is registered again.
    pub fn unregister_handler(&self, job_type: impl Into<JobType>) -> bool {
        self.inner.handlers_mut().unregister(&job_type.into())
    }

    /// Run one processing pass, unless one is already running, the session
    /// retry cap is reached, or the device is offline.
    ///
    /// Any scheduled retry is cancelled first, even when the call turns out
    /// to be a no-op. A trigger that lands while another pass is running
    /// (an enqueue with `process_on_enqueue`, or a short backoff timer firing
    /// during a long pass) can therefore drop the retry that pass scheduled;
    /// the pending job then waits for the next trigger (enqueue, reconnect,
    /// `retry_failed` or an explicit call).
    pub async fn process_queue(&self) {
        let inner = &self.inner;
        inner.timer.cancel();

        let Some(_guard) = ProcessingGuard::acquire(&inner.processing) else {
            tracing::debug!("processing pass already running");
            return;
        };

        let cap = inner.policy.max_session_retries;
        if inner.session.is_tripped(cap) {
            tracing::warn!(
                session_retries = inner.session.get(),
                cap,
                "session retry limit reached; not processing"
            );
            return;
        }

        let connectivity = inner.connectivity.current().await;
        if !connectivity.is_online() {
            tracing::debug!(
                is_connected = connectivity.is_connected,
                is_internet_reachable = ?connectivity.is_internet_reachable,
                "offline; skipping processing pass"
            );
            return;
        }

        // jobs enqueued after this point wait for the next pass
        let snapshot: Vec<JobId> = {
            let jobs = inner.jobs.lock().await;
            jobs.iter()
                .filter(|j| j.status.is_runnable())
                .map(|j| j.id)
                .collect()
        };
        tracing::debug!(jobs = snapshot.len(), "processing pass started");

        for id in snapshot {
            self.process_job(id).await;
        }

        let mut jobs = inner.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.status != JobStatus::Completed);
        let pruned = before - jobs.len();
        inner.persist(&jobs).await;

        let status = QueueStatus::from_jobs(jobs.iter());
        if status.pending == 0 {
            inner.session.reset();
        }
        tracing::debug!(
            pruned,
            pending = status.pending,
            failed = status.failed,
            "processing pass finished"
        );
    }

    async fn process_job(&self, id: JobId) {
        let inner = &self.inner;

        let (job, handler) = {
            let mut jobs = inner.jobs.lock().await;
            // cancelled or cleared since the snapshot
            let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
                return;
            };
            if !job.status.is_runnable() {
                return;
            }
            let Some(handler) = inner.handler_for(&job.job_type) else {
                tracing::warn!(job_id = %id, job_type = %job.job_type, "no handler registered; skipping");
                return;
            };

            job.start_attempt(inner.clock.now());
            let job = job.clone();
            inner.persist(&jobs).await;
            (job, handler)
        };

        tracing::debug!(job_id = %id, job_type = %job.job_type, retry_count = job.retry_count, "job started");
        let result = handler.handle(&job).await;

        let mut retry_in = None;
        {
            let mut jobs = inner.jobs.lock().await;
            let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
                return;
            };
            let now = inner.clock.now();

            match result {
                Ok(()) => {
                    job.mark_completed(now);
                    tracing::info!(job_id = %id, job_type = %job.job_type, "job completed");
                }
                Err(err) => {
                    job.record_failure(err.to_string(), now);
                    match inner.policy.decide(job, &inner.session) {
                        RetryDecision::Retry { delay } => {
                            job.requeue(now);
                            tracing::warn!(
                                job_id = %id,
                                job_type = %job.job_type,
                                retry_count = job.retry_count,
                                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                error = %err,
                                "job failed; retry scheduled"
                            );
                            retry_in = Some(delay);
                        }
                        RetryDecision::Exhausted => {
                            job.mark_failed(now);
                            tracing::error!(
                                job_id = %id,
                                job_type = %job.job_type,
                                retry_count = job.retry_count,
                                error = %err,
                                "job failed permanently"
                            );
                        }
                        RetryDecision::SessionLimit => {
                            job.fail_with(QueueError::SessionLimitExceeded.to_string(), now);
                            tracing::error!(
                                job_id = %id,
                                job_type = %job.job_type,
                                session_retries = inner.session.get(),
                                error = %err,
                                "session retry limit reached; job failed"
                            );
                        }
                    }
                }
            }
            inner.persist(&jobs).await;
        }

        if let Some(delay) = retry_in {
            self.schedule_retry(delay);
        }
    }

    fn schedule_retry(&self, delay: Duration) {
        if self.inner.destroyed.load(Ordering::Acquire) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .timer
            .replace(|generation| tokio::spawn(retry_after(weak, generation, delay)));
    }

    /// Reset every failed job to pending with a fresh retry budget, reset the
    /// session counter, and run a pass.
    pub async fn retry_failed(&self) {
        {
            let mut jobs = self.inner.jobs.lock().await;
            let now = self.inner.clock.now();
            let mut reset = 0usize;
            for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Failed) {
                job.reset_for_retry(now);
                reset += 1;
            }
            tracing::info!(reset, "failed jobs reset for retry");
            self.inner.persist(&jobs).await;
        }
        self.inner.session.reset();
        self.process_queue().await;
    }

    pub async fn get_status(&self) -> QueueStatus {
        QueueStatus::from_jobs(self.inner.jobs.lock().await.iter())
    }

    /// Remove every job except those being processed.
    pub async fn clear_queue(&self) {
        let mut jobs = self.inner.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.status == JobStatus::Processing);
        tracing::info!(removed = before - jobs.len(), "queue cleared");
        self.inner.persist(&jobs).await;
    }

    /// Remove completed and failed jobs.
    pub async fn clear_finished(&self) {
        let mut jobs = self.inner.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| !j.status.is_terminal());
        tracing::info!(removed = before - jobs.len(), "finished jobs cleared");
        self.inner.persist(&jobs).await;
    }

    /// Cancel the retry timer and stop the connectivity monitor.
    ///
    /// Does not wait for a running handler. Management calls keep working;
    /// no retry is scheduled after this.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.timer.cancel();
        if let Some(monitor) = inner.monitor_slot().take() {
            monitor.request_shutdown();
        }
        tracing::info!("offline queue destroyed");
    }

    /// Snapshot of all jobs in queue order.
    pub async fn jobs(&self) -> Vec<Job> {
        self.inner.jobs.lock().await.clone()
    }

    pub async fn job(&self, id: JobId) -> Option<Job> {
        self.inner
            .jobs
            .lock()
            .await
            .iter()
            .find(|j| j.id == id)
            .cloned()
    }

    pub fn session_retries(&self) -> u32 {
        self.inner.session.get()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::Acquire)
    }

    pub fn retry_scheduled(&self) -> bool {
        self.inner.timer.is_scheduled()
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        self.inner.handlers().registered_types()
    }
}

impl Inner {
    async fn persist(&self, jobs: &[Job]) {
        if let Err(e) = self.store.save(jobs).await {
            tracing::error!(key = %self.store.key(), error = %e, "failed to persist queue snapshot");
        }
    }

    fn handler_for(&self, job_type: &JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers().get(job_type)
    }

    fn handlers(&self) -> std::sync::RwLockReadGuard<'_, HandlerRegistry> {
        self.handlers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn handlers_mut(&self) -> std::sync::RwLockWriteGuard<'_, HandlerRegistry> {
        self.handlers.write().unwrap_or_else(|e| e.into_inner())
    }

    fn monitor_slot(&self) -> std::sync::MutexGuard<'_, Option<ConnectivityMonitor>> {
        self.monitor.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Timer body: wait, then run a pass if this timer still owns the slot.
///
/// Boxed so the pass it starts does not make `process_queue` a recursive
/// future type.
fn retry_after(
    weak: Weak<Inner>,
    generation: u64,
    delay: Duration,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        tokio::time::sleep(delay).await;
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if !inner.timer.release(generation) {
            return;
        }
        tracing::debug!("retry timer fired");
        OfflineQueue { inner }.process_queue().await;
    })
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
