use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ports::ConnectivitySnapshot;

/// Connectivity monitor handle.
/// - offline → online の遷移で `on_online` を起動する
/// - 購読開始時の状態も遷移として扱う（起動直後に online なら即実行）
/// - `request_shutdown()` で購読を止める
pub struct ConnectivityMonitor {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// Spawn the monitor task.
    ///
    /// Each future returned by `on_online` is spawned on its own, so a long
    /// pass never delays observing the next change.
    pub fn spawn<F, Fut>(changes: watch::Receiver<ConnectivitySnapshot>, on_online: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(monitor_loop(changes, shutdown_rx, on_online));
        Self { shutdown_tx, join }
    }

    /// Stop listening. In-flight passes are not cancelled.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

async fn monitor_loop<F, Fut>(
    mut changes: watch::Receiver<ConnectivitySnapshot>,
    mut shutdown_rx: watch::Receiver<bool>,
    on_online: F,
) where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut was_online = false;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let snapshot = *changes.borrow_and_update();
        let online = snapshot.is_online();
        if online && !was_online {
            tracing::info!("connectivity available; triggering queue processing");
            tokio::spawn(on_online());
        } else if !online && was_online {
            tracing::info!(
                is_connected = snapshot.is_connected,
                is_internet_reachable = ?snapshot.is_internet_reachable,
                "connectivity lost"
            );
        }
        was_online = online;

        tokio::select! {
            res = shutdown_rx.changed() => {
                // handle dropped without request_shutdown
                if res.is_err() {
                    break;
                }
                // 次のループで判定
                continue;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    tracing::debug!("connectivity source closed; monitor stopping");
                    break;
                }
            }
        }
    }
}
