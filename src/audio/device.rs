//! Default-output-device change monitoring.
//!
//! The OS-level property listener belongs to the embedding application; it
//! pushes the identifier of the new default output device into a channel.
//! This monitor consumes that feed, drops duplicate notifications (macOS
//! fires several for one switch), and dispatches genuine changes to a
//! handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Async handler invoked with the device identifier on every genuine change.
pub type DeviceChangeHandler =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Watches a feed of default-output-device identifiers.
pub struct DeviceChangeMonitor {
    feed: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    last_device: Arc<Mutex<Option<String>>>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl DeviceChangeMonitor {
    /// Wrap a notification feed. Nothing is consumed until `start`.
    pub fn new(feed: mpsc::Receiver<String>) -> Self {
        Self {
            feed: Arc::new(tokio::sync::Mutex::new(feed)),
            last_device: Arc::new(Mutex::new(None)),
            cancel: None,
            task: None,
        }
    }

    /// Begin watching. `on_change` fires once per distinct device, in feed
    /// order. No-op when already watching.
    pub fn start(&mut self, on_change: DeviceChangeHandler) {
        if self.task.is_some() {
            debug!("device monitor already running");
            return;
        }
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let feed = Arc::clone(&self.feed);
        let last_device = Arc::clone(&self.last_device);

        self.task = Some(tokio::spawn(async move {
            loop {
                let notification = tokio::select! {
                    _ = token.cancelled() => break,
                    id = async { feed.lock().await.recv().await } => id,
                };
                let Some(device_id) = notification else {
                    debug!("device notification feed closed");
                    break;
                };
                {
                    let mut last = last_device.lock();
                    if last.as_deref() == Some(device_id.as_str()) {
                        debug!("ignoring duplicate device notification: {}", device_id);
                        continue;
                    }
                    *last = Some(device_id.clone());
                }
                info!("default output device changed: {}", device_id);
                on_change(device_id).await;
            }
        }));
        self.cancel = Some(cancel);
    }

    /// Stop watching. The feed and the last-seen identifier survive, so a
    /// later `start` resumes without replaying old duplicates.
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Identifier from the most recent genuine change.
    pub fn last_device(&self) -> Option<String> {
        self.last_device.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}
