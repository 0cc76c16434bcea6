//! KeyValueStore port - 端末ローカルの永続ストレージ
//!
//! The queue persists its whole job list as one string value under one key,
//! so the port only needs `get` and `set`.

use async_trait::async_trait;

use crate::error::QueueError;

/// Durable string key-value storage (AsyncStorage-like).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `Ok(None)` when the key was never written.
    async fn get(&self, key: &str) -> Result<Option<String>, QueueError>;

    /// Overwrite the value stored under `key`.
    async fn set(&self, key: &str, value: String) -> Result<(), QueueError>;
}
