//! OfflineQueueBuilder - キューの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 依存の明示的な注入（グローバル singleton なし）

use std::sync::Arc;

use crate::config::QueueConfig;
use crate::domain::JobType;
use crate::ports::{Clock, ConnectivitySource, IdGenerator, KeyValueStore, SystemClock, UlidGenerator};
use crate::queue::{OfflineQueue, QueueParts};
use crate::runtime::{HandlerRegistry, JobHandler};
use crate::store::JobStore;
use crate::typed::{TypedJob, TypedJobHandler};

/// OfflineQueueBuilder はキューを構築
///
/// # 使用例
/// ```ignore
/// let queue = OfflineQueueBuilder::new()
///     .store(Arc::new(FileKvStore::new("./.offq")))
///     .connectivity(Arc::new(WatchConnectivity::offline()))
///     .handler("sync_contacts", handler_fn(sync_contacts))
///     .expect_types(&["sync_contacts"])
///     .build()
///     .await?;
/// ```
///
/// # Fail-fast 設計
/// - store / connectivity は必須
/// - expect_types() で期待される job_type を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
pub struct OfflineQueueBuilder {
    kv: Option<Arc<dyn KeyValueStore>>,
    connectivity: Option<Arc<dyn ConnectivitySource>>,
    registry: HandlerRegistry,
    config: QueueConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    expected_types: Option<Vec<JobType>>,
    monitor_connectivity: bool,
}

/// BuildError はキュー構築時のエラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("no key-value store configured")]
    MissingStore,

    #[error("no connectivity source configured")]
    MissingConnectivity,

    #[error("Missing job types: {0:?}. These job types were expected but have no handler.")]
    MissingJobTypes(Vec<JobType>),
}

impl OfflineQueueBuilder {
    pub fn new() -> Self {
        Self {
            kv: None,
            connectivity: None,
            registry: HandlerRegistry::new(),
            config: QueueConfig::default(),
            clock: None,
            ids: None,
            expected_types: None,
            monitor_connectivity: true,
        }
    }

    /// Backing key-value store for the job snapshot.
    pub fn store(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn connectivity(mut self, source: Arc<dyn ConnectivitySource>) -> Self {
        self.connectivity = Some(source);
        self
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a [`UlidGenerator`] on the configured clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn handler(mut self, job_type: impl Into<JobType>, handler: Arc<dyn JobHandler>) -> Self {
        self.registry.register(job_type, handler);
        self
    }

    pub fn typed_handler<T, H>(mut self, handler: H) -> Self
    where
        T: TypedJob,
        H: TypedJobHandler<T> + 'static,
    {
        self.registry.register_typed::<T, H>(handler);
        self
    }

    /// 期待される job_type のリストを設定
    pub fn expect_types(mut self, job_types: &[&str]) -> Self {
        self.expected_types = Some(job_types.iter().map(|&t| JobType::new(t)).collect());
        self
    }

    /// Whether to process automatically when connectivity comes back
    /// (default `true`). Without it, passes run only on explicit triggers.
    pub fn monitor_connectivity(mut self, enabled: bool) -> Self {
        self.monitor_connectivity = enabled;
        self
    }

    /// 検証してキューを生成
    ///
    /// # 検証
    /// - store / connectivity が設定されているか
    /// - expect_types() の job_type が全て登録されているか
    ///
    /// Loads the persisted snapshot and, unless disabled, starts the
    /// connectivity monitor. Must run inside a tokio runtime.
    pub async fn build(self) -> Result<OfflineQueue, BuildError> {
        let kv = self.kv.ok_or(BuildError::MissingStore)?;
        let connectivity = self.connectivity.ok_or(BuildError::MissingConnectivity)?;

        if let Some(expected) = &self.expected_types {
            let missing: Vec<JobType> = expected
                .iter()
                .filter(|t| !self.registry.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingJobTypes(missing));
            }
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        Ok(OfflineQueue::open(QueueParts {
            store: JobStore::new(kv, self.config.storage_key.clone()),
            connectivity,
            handlers: self.registry,
            config: self.config,
            clock,
            ids,
            monitor_connectivity: self.monitor_connectivity,
        })
        .await)
    }
}

impl Default for OfflineQueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}
