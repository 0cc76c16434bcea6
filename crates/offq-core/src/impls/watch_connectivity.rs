//! WatchConnectivity - 手動で状態を流す ConnectivitySource
//!
//! Platform glue (or a test) pushes snapshots with `set`; the queue reads
//! and subscribes through the port.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::ports::{ConnectivitySnapshot, ConnectivitySource};

#[derive(Debug)]
pub struct WatchConnectivity {
    tx: watch::Sender<ConnectivitySnapshot>,
}

impl WatchConnectivity {
    pub fn new(initial: ConnectivitySnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn online() -> Self {
        Self::new(ConnectivitySnapshot::online())
    }

    pub fn offline() -> Self {
        Self::new(ConnectivitySnapshot::offline())
    }

    /// Publish a new snapshot. Works with or without subscribers.
    pub fn set(&self, snapshot: ConnectivitySnapshot) {
        self.tx.send_replace(snapshot);
    }

    pub fn set_online(&self, online: bool) {
        self.set(if online {
            ConnectivitySnapshot::online()
        } else {
            ConnectivitySnapshot::offline()
        });
    }
}

#[async_trait]
impl ConnectivitySource for WatchConnectivity {
    async fn current(&self) -> ConnectivitySnapshot {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivitySnapshot> {
        self.tx.subscribe()
    }
}
