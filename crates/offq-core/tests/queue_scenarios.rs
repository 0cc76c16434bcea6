mod common;

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use common::*;
use offq_core::impls::{FileKvStore, MemoryKvStore, WatchConnectivity};
use offq_core::ports::KeyValueStore;
use offq_core::{
    EnqueueOptions, HandlerError, Job, JobId, JobStatus, JobType, OfflineQueue,
    OfflineQueueBuilder, Payload, QueueConfig, QueueError, QueueStatus, TypedJob,
    TypedJobHandler,
};

#[tokio::test]
async fn enqueue_returns_unique_ids_for_pending_jobs() {
    let h = harness(manual_config(), false, vec![]).await;

    let mut ids = Vec::new();
    for i in 0..20 {
        let id = h
            .queue
            .enqueue("sync_contacts", payload(&[("page", serde_json::json!(i))]))
            .await;
        ids.push(id);
    }

    let unique: HashSet<JobId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());

    let persisted = h.persisted().await;
    assert_eq!(persisted.iter().map(|j| j.id).collect::<Vec<_>>(), ids);
    for job in &persisted {
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.last_error, None);
    }
    assert_eq!(persisted[7].payload["page"], 7);
}

#[tokio::test]
async fn successful_job_is_completed_and_pruned() {
    let handler = FlakyHandler::succeeding();
    let h = harness(manual_config(), true, vec![on("sync", handler.clone())]).await;

    let id = h.queue.enqueue("sync", Payload::new()).await;
    h.queue.process_queue().await;

    assert_eq!(handler.calls(), 1);
    assert!(h.queue.job(id).await.is_none());
    assert!(h.persisted().await.is_empty());
    assert_eq!(h.queue.get_status().await, QueueStatus::default());
    assert!(!h.queue.retry_scheduled());
}

#[tokio::test(start_paused = true)]
async fn failing_job_backs_off_then_fails_permanently() {
    let handler = FlakyHandler::always_failing();
    let h = harness(manual_config(), true, vec![on("sync", handler.clone())]).await;

    let id = h
        .queue
        .enqueue_with("sync", Payload::new(), EnqueueOptions::max_retries(2))
        .await;

    // pass 1
    h.queue.process_queue().await;
    let job = h.queue.job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.last_error.as_deref(), Some("network error (call 1)"));
    assert!(h.queue.retry_scheduled());
    assert_eq!(h.persisted().await, vec![job]);

    // first retry waits one base delay
    sleep(Duration::from_millis(999)).await;
    assert_eq!(handler.calls(), 1);

    // pass 2, started by the timer
    sleep(Duration::from_millis(2)).await;
    assert_eq!(handler.calls(), 2);
    let job = h.queue.job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 2);
    assert_eq!(job.last_error.as_deref(), Some("network error (call 2)"));
    assert!(!h.queue.retry_scheduled());

    // no automatic retry of a failed job
    sleep(Duration::from_secs(120)).await;
    assert_eq!(handler.calls(), 2);
    assert_eq!(h.queue.get_status().await.failed, 1);
    assert_eq!(h.persisted().await[0].status, JobStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn session_retry_cap_fails_jobs_and_stops_processing() {
    let handler = FlakyHandler::always_failing();
    let config = QueueConfig {
        max_session_retries: 2,
        ..manual_config()
    };
    let h = harness(config, true, vec![on("sync", handler.clone())]).await;

    let opts = EnqueueOptions::max_retries(5);
    let a = h.queue.enqueue_with("sync", Payload::new(), opts).await;
    let b = h.queue.enqueue_with("sync", Payload::new(), opts).await;

    h.queue.process_queue().await;
    assert_eq!(handler.calls(), 2);

    let job_a = h.queue.job(a).await.unwrap();
    assert_eq!(job_a.status, JobStatus::Pending);
    assert_eq!(job_a.retry_count, 1);

    let job_b = h.queue.job(b).await.unwrap();
    assert_eq!(job_b.status, JobStatus::Failed);
    assert_eq!(job_b.retry_count, 1);
    assert_eq!(
        job_b.last_error.as_deref(),
        Some("Max session retries exceeded")
    );
    assert_eq!(h.queue.session_retries(), 2);

    // the scheduled retry fires but the breaker is open
    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(handler.calls(), 2);
    assert!(!h.queue.retry_scheduled());
    h.queue.process_queue().await;
    assert_eq!(handler.calls(), 2);
    assert_eq!(h.queue.job(a).await.unwrap().status, JobStatus::Pending);

    // retry_failed closes the breaker and runs a pass right away
    h.queue.retry_failed().await;
    assert_eq!(handler.calls(), 4);
    let job_b = h.queue.job(b).await.unwrap();
    assert_eq!(job_b.status, JobStatus::Failed);
    assert_eq!(job_b.retry_count, 1);
}

#[tokio::test]
async fn cancel_only_removes_jobs_that_are_not_processing() {
    let blocking = BlockingHandler::new();
    let other = FlakyHandler::succeeding();
    let h = harness(
        manual_config(),
        true,
        vec![on("slow", blocking.clone()), on("other", other.clone())],
    )
    .await;

    let slow = h.queue.enqueue("slow", Payload::new()).await;
    let doomed = h.queue.enqueue("other", Payload::new()).await;

    assert!(h.queue.cancel(doomed).await);
    assert!(!h.queue.cancel(doomed).await);
    assert!(h.persisted().await.iter().all(|j| j.id != doomed));

    let queue = h.queue.clone();
    let pass = tokio::spawn(async move { queue.process_queue().await });
    blocking.started.notified().await;

    assert!(!h.queue.cancel(slow).await);
    assert_eq!(
        h.queue.job(slow).await.unwrap().status,
        JobStatus::Processing
    );
    assert_eq!(h.persisted().await[0].status, JobStatus::Processing);
    assert_eq!(h.queue.get_status().await.processing, 1);

    blocking.release.notify_one();
    pass.await.unwrap();
    assert!(h.queue.job(slow).await.is_none());
    assert_eq!(other.calls(), 0);
}

#[tokio::test]
async fn trigger_during_a_pass_is_a_no_op_and_late_jobs_wait() {
    let blocking = BlockingHandler::new();
    let other = FlakyHandler::succeeding();
    let h = harness(
        manual_config(),
        true,
        vec![on("slow", blocking.clone()), on("other", other.clone())],
    )
    .await;

    let slow = h.queue.enqueue("slow", Payload::new()).await;
    let early = h.queue.enqueue("other", Payload::new()).await;

    let queue = h.queue.clone();
    let pass = tokio::spawn(async move { queue.process_queue().await });
    blocking.started.notified().await;
    assert!(h.queue.is_processing());

    // returns immediately while the first pass is blocked
    h.queue.process_queue().await;
    assert_eq!(blocking.calls(), 1);
    assert_eq!(other.calls(), 0);

    let late = h.queue.enqueue("other", Payload::new()).await;

    blocking.release.notify_one();
    pass.await.unwrap();
    assert!(!h.queue.is_processing());

    assert!(h.queue.job(slow).await.is_none());
    assert!(h.queue.job(early).await.is_none());
    assert_eq!(other.calls(), 1);
    assert_eq!(h.queue.job(late).await.unwrap().status, JobStatus::Pending);

    h.queue.process_queue().await;
    assert_eq!(other.calls(), 2);
    assert!(h.queue.jobs().await.is_empty());
}

#[tokio::test]
async fn offline_pass_invokes_nothing_and_mutates_nothing() {
    let handler = FlakyHandler::succeeding();
    let h = harness(manual_config(), false, vec![on("sync", handler.clone())]).await;

    let id = h.queue.enqueue("sync", Payload::new()).await;
    let before = h.queue.job(id).await.unwrap();
    let persisted_before = h.kv.get(KEY).await.unwrap();

    h.queue.process_queue().await;

    assert_eq!(handler.calls(), 0);
    assert_eq!(h.queue.job(id).await.unwrap(), before);
    assert_eq!(h.kv.get(KEY).await.unwrap(), persisted_before);

    // connected but reachability unknown is still offline
    h.net.set(offq_core::ports::ConnectivitySnapshot {
        is_connected: true,
        is_internet_reachable: None,
    });
    h.queue.process_queue().await;
    assert_eq!(handler.calls(), 0);

    h.net.set_online(true);
    h.queue.process_queue().await;
    assert_eq!(handler.calls(), 1);
    assert!(h.queue.job(id).await.is_none());
}

#[tokio::test]
async fn retry_failed_resets_jobs_and_runs_a_pass() {
    let handler = FlakyHandler::new(1);
    let h = harness(manual_config(), true, vec![on("sync", handler.clone())]).await;

    let id = h
        .queue
        .enqueue_with("sync", Payload::new(), EnqueueOptions::max_retries(1))
        .await;
    h.queue.process_queue().await;

    let job = h.queue.job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 1);
    assert!(!h.queue.retry_scheduled());

    h.queue.retry_failed().await;
    assert_eq!(handler.calls(), 2);
    assert!(h.queue.job(id).await.is_none());
    assert!(h.persisted().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn job_failing_twice_completes_on_third_pass() {
    let handler = FlakyHandler::new(2);
    let h = harness(manual_config(), true, vec![on("sync", handler.clone())]).await;
    let id = h.queue.enqueue("sync", Payload::new()).await;

    h.queue.process_queue().await;
    let stored = h.persisted().await;
    assert_eq!(stored[0].id, id);
    assert_eq!(stored[0].status, JobStatus::Pending);
    assert_eq!(stored[0].retry_count, 1);

    // 1s backoff
    sleep(Duration::from_millis(1_001)).await;
    let stored = h.persisted().await;
    assert_eq!(stored[0].status, JobStatus::Pending);
    assert_eq!(stored[0].retry_count, 2);
    assert_eq!(h.queue.session_retries(), 2);

    // 2s backoff
    sleep(Duration::from_millis(1_998)).await;
    assert_eq!(handler.calls(), 2);
    sleep(Duration::from_millis(2)).await;
    assert_eq!(handler.calls(), 3);

    assert!(h.persisted().await.is_empty());
    assert_eq!(h.queue.get_status().await, QueueStatus::default());
    assert_eq!(h.queue.session_retries(), 0);
}

#[tokio::test]
async fn jobs_without_handler_stay_pending() {
    let handler = FlakyHandler::succeeding();
    let h = harness(manual_config(), true, vec![on("sync", handler.clone())]).await;

    assert!(h.queue.unregister_handler("sync"));
    assert!(!h.queue.unregister_handler("sync"));

    let id = h.queue.enqueue("sync", Payload::new()).await;
    let before = h.queue.job(id).await.unwrap();
    h.queue.process_queue().await;
    assert_eq!(h.queue.job(id).await.unwrap(), before);
    assert_eq!(handler.calls(), 0);

    h.queue.register_handler("sync", handler.clone());
    h.queue.process_queue().await;
    assert_eq!(handler.calls(), 1);
    assert!(h.queue.job(id).await.is_none());
}

#[tokio::test]
async fn clear_finished_and_clear_queue() {
    let failing = FlakyHandler::always_failing();
    let h = harness(manual_config(), true, vec![on("fail", failing.clone())]).await;

    let failed = h
        .queue
        .enqueue_with("fail", Payload::new(), EnqueueOptions::max_retries(1))
        .await;
    let orphan = h.queue.enqueue("unhandled", Payload::new()).await;
    h.queue.process_queue().await;
    assert_eq!(
        h.queue.get_status().await,
        QueueStatus {
            pending: 1,
            processing: 0,
            failed: 1
        }
    );

    h.queue.clear_finished().await;
    assert!(h.queue.job(failed).await.is_none());
    assert!(h.queue.job(orphan).await.is_some());

    h.queue.clear_queue().await;
    assert!(h.queue.jobs().await.is_empty());
    assert!(h.persisted().await.is_empty());
}

#[tokio::test]
async fn clear_queue_keeps_the_processing_job() {
    let blocking = BlockingHandler::new();
    let h = harness(manual_config(), true, vec![on("slow", blocking.clone())]).await;

    let slow = h.queue.enqueue("slow", Payload::new()).await;
    let waiting = h.queue.enqueue("unhandled", Payload::new()).await;

    let queue = h.queue.clone();
    let pass = tokio::spawn(async move { queue.process_queue().await });
    blocking.started.notified().await;

    h.queue.clear_queue().await;
    assert!(h.queue.job(slow).await.is_some());
    assert!(h.queue.job(waiting).await.is_none());

    blocking.release.notify_one();
    pass.await.unwrap();
    assert!(h.queue.jobs().await.is_empty());
}

#[tokio::test]
async fn interrupted_jobs_are_recovered_as_pending() {
    let kv = MemoryKvStore::new();
    let mut job = Job::new(
        JobId::from_ulid(ulid::Ulid::new()),
        JobType::new("sync"),
        Payload::new(),
        3,
        chrono::Utc::now(),
    );
    job.start_attempt(chrono::Utc::now());
    job.record_failure("earlier failure", chrono::Utc::now());
    job.start_attempt(chrono::Utc::now());
    kv.set(KEY, serde_json::to_string(&vec![job.clone()]).unwrap())
        .await
        .unwrap();

    let h = harness_with_kv(kv, manual_config(), false, vec![]).await;

    let recovered = h.queue.job(job.id).await.unwrap();
    assert_eq!(recovered.status, JobStatus::Pending);
    assert_eq!(recovered.retry_count, 1);
    assert_eq!(h.persisted().await[0].status, JobStatus::Pending);
    assert!(h.queue.cancel(job.id).await);
}

#[tokio::test]
async fn corrupt_snapshot_opens_an_empty_queue() {
    let kv = MemoryKvStore::new();
    kv.set(KEY, "[{\"oops\":".to_string()).await.unwrap();

    let h = harness_with_kv(kv, manual_config(), false, vec![]).await;
    assert!(h.queue.jobs().await.is_empty());

    h.queue.enqueue("sync", Payload::new()).await;
    assert_eq!(h.persisted().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn monitor_processes_when_connectivity_returns() {
    let handler = FlakyHandler::succeeding();
    let net = Arc::new(WatchConnectivity::offline());
    let queue = OfflineQueueBuilder::new()
        .store(Arc::new(MemoryKvStore::new()))
        .connectivity(net.clone())
        .config(manual_config())
        .handler("sync", handler.clone())
        .build()
        .await
        .unwrap();

    let id = queue.enqueue("sync", Payload::new()).await;
    sleep(Duration::from_millis(10)).await;
    assert_eq!(handler.calls(), 0);

    net.set_online(true);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(handler.calls(), 1);
    assert!(queue.job(id).await.is_none());

    // after destroy, reconnecting no longer triggers anything
    queue.destroy();
    queue.enqueue("sync", Payload::new()).await;
    net.set_online(false);
    sleep(Duration::from_millis(10)).await;
    net.set_online(true);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(handler.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn enqueue_triggers_processing_when_enabled() {
    let handler = FlakyHandler::succeeding();
    let h = harness(QueueConfig::default(), true, vec![on("sync", handler.clone())]).await;

    let id = h.queue.enqueue("sync", Payload::new()).await;
    sleep(Duration::from_millis(10)).await;

    assert_eq!(handler.calls(), 1);
    assert!(h.queue.job(id).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn destroy_cancels_the_scheduled_retry() {
    let handler = FlakyHandler::always_failing();
    let h = harness(manual_config(), true, vec![on("sync", handler.clone())]).await;

    let id = h.queue.enqueue("sync", Payload::new()).await;
    h.queue.process_queue().await;
    assert!(h.queue.retry_scheduled());

    h.queue.destroy();
    assert!(!h.queue.retry_scheduled());

    sleep(Duration::from_secs(120)).await;
    assert_eq!(handler.calls(), 1);
    assert_eq!(h.queue.job(id).await.unwrap().status, JobStatus::Pending);
    assert_eq!(h.queue.get_status().await.pending, 1);
}

#[derive(Debug, Serialize, Deserialize)]
struct Greet {
    name: String,
}

impl TypedJob for Greet {
    const TYPE: &'static str = "greet";
}

#[derive(Serialize, Deserialize)]
struct Ping(String);

impl TypedJob for Ping {
    const TYPE: &'static str = "ping";
}

struct GreetHandler {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TypedJobHandler<Greet> for GreetHandler {
    async fn handle(&self, payload: Greet, _job: &Job) -> Result<(), HandlerError> {
        self.seen
            .lock()
            .map_err(|_| HandlerError::new("poisoned"))?
            .push(payload.name);
        Ok(())
    }
}

#[tokio::test]
async fn typed_jobs_round_trip_through_the_queue() {
    let h = harness(manual_config(), true, vec![]).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    h.queue.register_typed::<Greet, _>(GreetHandler { seen: seen.clone() });

    let id = h
        .queue
        .enqueue_typed(&Greet {
            name: "alice".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(h.queue.job(id).await.unwrap().job_type, JobType::new("greet"));

    h.queue.process_queue().await;
    assert_eq!(*seen.lock().unwrap(), vec!["alice".to_string()]);

    let err = h.queue.enqueue_typed(&Ping("x".to_string())).await.unwrap_err();
    assert!(matches!(err, QueueError::PayloadNotObject("string")));
}

async fn open_on_disk(dir: &Path, net: Arc<WatchConnectivity>) -> OfflineQueue {
    OfflineQueueBuilder::new()
        .store(Arc::new(FileKvStore::new(dir)))
        .connectivity(net)
        .config(manual_config())
        .monitor_connectivity(false)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn queue_survives_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let net = Arc::new(WatchConnectivity::offline());

    let first = open_on_disk(dir.path(), net.clone()).await;
    let a = first.enqueue("sync", Payload::new()).await;
    let b = first.enqueue("sync", Payload::new()).await;
    first.destroy();
    drop(first);

    let second = open_on_disk(dir.path(), net.clone()).await;
    let ids: Vec<JobId> = second.jobs().await.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![a, b]);

    let handler = FlakyHandler::succeeding();
    second.register_handler("sync", handler.clone());
    net.set_online(true);
    second.process_queue().await;
    assert_eq!(handler.calls(), 2);

    let raw = std::fs::read_to_string(dir.path().join("offline_queue.json")).unwrap();
    assert_eq!(raw, "[]");
}
