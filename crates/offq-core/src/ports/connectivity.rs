//! Connectivity port - ネットワーク状態の購読

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Network state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectivitySnapshot {
    pub is_connected: bool,

    /// `None` while the platform has not determined reachability yet.
    pub is_internet_reachable: Option<bool>,
}

impl ConnectivitySnapshot {
    pub fn online() -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Some(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: Some(false),
        }
    }

    /// Connected AND internet reachable. Unknown reachability counts as offline.
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable == Some(true)
    }
}

/// Source of connectivity state and change notifications.
#[async_trait]
pub trait ConnectivitySource: Send + Sync {
    /// Query the current state.
    async fn current(&self) -> ConnectivitySnapshot;

    /// Subscribe to changes. The receiver starts at the current state.
    fn subscribe(&self) -> watch::Receiver<ConnectivitySnapshot>;
}
