use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, sleep};

use offq_core::impls::{FileKvStore, WatchConnectivity};
use offq_core::{
    HandlerError, Job, OfflineQueueBuilder, QueueConfig, TypedJob, TypedJobHandler, handler_fn,
    observability,
};

#[derive(Debug, Serialize, Deserialize)]
struct SyncContacts {
    account: String,
}

impl TypedJob for SyncContacts {
    const TYPE: &'static str = "sync_contacts";
}

/// 最初の数回はわざと失敗する handler（リトライの様子を見る用）
struct FlakySync {
    remaining_failures: AtomicU32,
}

#[async_trait]
impl TypedJobHandler<SyncContacts> for FlakySync {
    async fn handle(&self, payload: SyncContacts, job: &Job) -> Result<(), HandlerError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(HandlerError::new(format!(
                "server unavailable (left={left})"
            )));
        }

        println!(
            "synced contacts for {} (after {} retries)",
            payload.account, job.retry_count
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = QueueConfig::from_env().context("reading OFFQ_* configuration")?;
    let data_dir = std::env::var("OFFQ_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.offq"));

    // (A) 端末はオフラインで起動
    let connectivity = Arc::new(WatchConnectivity::offline());

    let queue = OfflineQueueBuilder::new()
        .store(Arc::new(FileKvStore::new(&data_dir)))
        .connectivity(connectivity.clone())
        .config(config)
        .typed_handler::<SyncContacts, _>(FlakySync {
            remaining_failures: AtomicU32::new(2),
        })
        .handler(
            "send_message",
            handler_fn(|job: Job| async move {
                let text = job
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| HandlerError::new("missing text"))?;
                println!("sent message: {text}");
                Ok::<(), HandlerError>(())
            }),
        )
        .expect_types(&[SyncContacts::TYPE, "send_message"])
        .build()
        .await
        .context("building offline queue")?;

    // (B) オフライン中に投入（保存されるだけで実行されない）
    let sync_id = queue
        .enqueue_typed(&SyncContacts {
            account: "alice".to_string(),
        })
        .await?;
    let mut payload = serde_json::Map::new();
    payload.insert("text".to_string(), serde_json::json!("hello from offline"));
    let msg_id = queue.enqueue("send_message", payload).await;
    println!("enqueued: {sync_id}, {msg_id}");
    println!("status while offline: {:?}", queue.get_status().await);

    // (C) オンライン復帰 → monitor が処理を開始
    sleep(Duration::from_millis(200)).await;
    connectivity.set_online(true);

    // (D) バックオフ（1s, 2s）を挟んで全件終わるまで待つ
    for _ in 0..50 {
        sleep(Duration::from_millis(200)).await;
        let status = queue.get_status().await;
        if status.is_idle() {
            break;
        }
    }

    println!("final status: {:?}", queue.get_status().await);
    for job in queue.jobs().await {
        println!(
            "left in queue: {} {} {} {:?}",
            job.id, job.job_type, job.status, job.last_error
        );
    }

    queue.destroy();
    Ok(())
}
