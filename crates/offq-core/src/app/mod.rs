//! App - 構築層
//!
//! ports と impls を組み合わせて `OfflineQueue` を組み立てます。
//!
//! # 主要コンポーネント
//! - **OfflineQueueBuilder**: キューの構築とワイヤリング、起動時検証

pub mod builder;

pub use self::builder::{BuildError, OfflineQueueBuilder};
