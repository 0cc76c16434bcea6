#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use offq_core::impls::{MemoryKvStore, WatchConnectivity};
use offq_core::ports::KeyValueStore;
use offq_core::{
    HandlerError, Job, JobHandler, OfflineQueue, OfflineQueueBuilder, Payload, QueueConfig,
};

pub const KEY: &str = "offline_queue";

/// Config for deterministic tests: no pass is started by `enqueue`.
pub fn manual_config() -> QueueConfig {
    QueueConfig {
        process_on_enqueue: false,
        ..QueueConfig::default()
    }
}

pub struct Harness {
    pub queue: OfflineQueue,
    pub kv: MemoryKvStore,
    pub net: Arc<WatchConnectivity>,
}

impl Harness {
    /// Jobs as currently persisted.
    pub async fn persisted(&self) -> Vec<Job> {
        persisted(&self.kv).await
    }
}

pub async fn persisted(kv: &MemoryKvStore) -> Vec<Job> {
    match kv.get(KEY).await.unwrap() {
        Some(raw) => serde_json::from_str(&raw).unwrap(),
        None => Vec::new(),
    }
}

/// Queue over a fresh memory store, monitor disabled.
pub async fn harness(
    config: QueueConfig,
    online: bool,
    handlers: Vec<(&str, Arc<dyn JobHandler>)>,
) -> Harness {
    harness_with_kv(MemoryKvStore::new(), config, online, handlers).await
}

pub async fn harness_with_kv(
    kv: MemoryKvStore,
    config: QueueConfig,
    online: bool,
    handlers: Vec<(&str, Arc<dyn JobHandler>)>,
) -> Harness {
    let net = Arc::new(if online {
        WatchConnectivity::online()
    } else {
        WatchConnectivity::offline()
    });

    let mut builder = OfflineQueueBuilder::new()
        .store(Arc::new(kv.clone()))
        .connectivity(net.clone())
        .config(config)
        .monitor_connectivity(false);
    for (job_type, handler) in handlers {
        builder = builder.handler(job_type, handler);
    }

    Harness {
        queue: builder.build().await.unwrap(),
        kv,
        net,
    }
}

/// Handler entry for [`harness`].
pub fn on<'a>(job_type: &'a str, handler: Arc<dyn JobHandler>) -> (&'a str, Arc<dyn JobHandler>) {
    (job_type, handler)
}

pub fn payload(pairs: &[(&str, serde_json::Value)]) -> Payload {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Fails a fixed number of times, then succeeds.
pub struct FlakyHandler {
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl FlakyHandler {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::new(u32::MAX)
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(0)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for FlakyHandler {
    async fn handle(&self, _job: &Job) -> Result<(), HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(HandlerError::new(format!("network error (call {call})")));
        }
        Ok(())
    }
}

/// Signals `started`, then waits for `release` before succeeding.
#[derive(Default)]
pub struct BlockingHandler {
    pub started: Notify,
    pub release: Notify,
    calls: AtomicU32,
}

impl BlockingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for BlockingHandler {
    async fn handle(&self, _job: &Job) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.release.notified().await;
        Ok(())
    }
}
