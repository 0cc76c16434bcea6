//! offq-core
//!
//! Persistent offline operation queue: work captured while the device is
//! offline is stored on device and executed by registered handlers once
//! connectivity returns, with exponential backoff and a session-wide retry
//! cap.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（JobId, Job, JobStatus, JobType）
//! - **ports**: 抽象化レイヤー（KeyValueStore, ConnectivitySource, Clock, IdGenerator）
//! - **impls**: ports の実装（MemoryKvStore, FileKvStore, WatchConnectivity）
//! - **store**: ジョブ一覧のスナップショット永続化
//! - **runtime**: JobHandler trait と HandlerRegistry
//! - **typed**: 型付き Job API（TypedJob, TypedJobHandler）
//! - **queue**: OfflineQueue（処理パス、リトライ方針、タイマー）
//! - **monitor**: 接続状態の監視
//! - **app**: OfflineQueueBuilder（構築と起動時検証）
//! - **config / error / observability**: 設定、エラー型、状態ビューとログ初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod monitor;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod runtime;
pub mod store;
pub mod typed;

pub use app::{BuildError, OfflineQueueBuilder};
pub use config::{ConfigError, QueueConfig};
pub use domain::{Job, JobId, JobStatus, JobType, Payload};
pub use error::{HandlerError, QueueError};
pub use observability::QueueStatus;
pub use queue::{EnqueueOptions, OfflineQueue, RetryDecision, RetryPolicy};
pub use runtime::{HandlerRegistry, JobHandler, handler_fn};
pub use typed::{TypedJob, TypedJobHandler};
