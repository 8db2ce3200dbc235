//! Background cleanup sweep

use crate::cache::store::ReadThroughCache;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Handle to a running cleanup sweep
///
/// The sweep stops when [`shutdown`](Self::shutdown) is awaited or the handle
/// is dropped.
#[derive(Debug)]
pub struct CleanupHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    pub(crate) fn spawn(cache: ReadThroughCache) -> Self {
        let interval = cache.config().cleanup_interval;
        let (shutdown, mut stop) = oneshot::channel::<()>();

        info!("Starting cache cleanup task (interval: {:?})", interval);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = ticker.tick() => {
                        if let Some(event) = cache.sweep_expired().await {
                            debug!("Cleanup sweep: {} entries removed", event.len());
                        }
                    }
                }
            }

            info!("Cache cleanup task stopped");
        });

        Self {
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Whether the sweep task is still running
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Stop the sweep and wait for the task to exit
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).ok();
        }
        if let Some(task) = self.task.take() {
            task.await.ok();
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
