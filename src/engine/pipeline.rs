//! One capture -> convert -> stream pipeline.
//!
//! Each of the engine's two sources owns a full copy of this machinery. The
//! capture handoff is a single-slot channel: live sources `try_send` into it
//! and drop the buffer when the converter is still busy, which keeps memory
//! and latency bounded no matter how far the service falls behind.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::audio::{AudioSource, CaptureSource, FormatConverter, PcmBuffer};
use crate::engine::budget::ErrorBudget;
use crate::engine::events::EngineEvent;
use crate::engine::{EngineConfig, EngineError};
use crate::stt::{SessionEvent, SessionEventHandler, StreamSession};

/// Capture handoff capacity. One slot, never more: a buffer that arrives
/// while the previous one is converting is dropped, not queued.
const CAPTURE_CHANNEL_CAPACITY: usize = 1;

pub(crate) struct SourcePipeline {
    source: AudioSource,
    capture: Arc<tokio::sync::Mutex<Box<dyn CaptureSource>>>,
    session: Arc<StreamSession>,
    events: mpsc::Sender<EngineEvent>,
    target_sample_rate: u32,
    budget_limit: u32,
    budget_cooldown: Duration,
    cancel: CancellationToken,
    capture_tx: Option<mpsc::Sender<PcmBuffer>>,
    forward_task: Option<JoinHandle<()>>,
    restart_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    running: bool,
}

impl SourcePipeline {
    pub(crate) fn new(
        source: AudioSource,
        capture: Box<dyn CaptureSource>,
        events: mpsc::Sender<EngineEvent>,
        config: &EngineConfig,
    ) -> Self {
        let handler: SessionEventHandler = {
            let events = events.clone();
            Arc::new(move |event: SessionEvent| {
                let events = events.clone();
                Box::pin(async move {
                    if events
                        .send(EngineEvent::from_session(source, event))
                        .await
                        .is_err()
                    {
                        debug!("engine event sink closed");
                    }
                }) as Pin<Box<dyn Future<Output = ()> + Send>>
            })
        };
        let session = Arc::new(StreamSession::new(config.stream.clone(), handler));

        Self {
            source,
            capture: Arc::new(tokio::sync::Mutex::new(capture)),
            session,
            events,
            target_sample_rate: config.stream.sample_rate,
            budget_limit: config.max_consecutive_errors,
            budget_cooldown: config.error_cooldown,
            cancel: CancellationToken::new(),
            capture_tx: None,
            forward_task: None,
            restart_task: Arc::new(Mutex::new(None)),
            running: false,
        }
    }

    /// Connect the session, then start capture. No-op when already running.
    ///
    /// A capture that refuses to start tears the fresh session back down so
    /// the pipeline never sits half-open.
    pub(crate) async fn start(&mut self) -> Result<(), EngineError> {
        if self.running {
            debug!("{} pipeline already running", self.source);
            return Ok(());
        }
        self.cancel = CancellationToken::new();
        self.session.connect().await?;

        let (capture_tx, capture_rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        if let Err(error) = self.capture.lock().await.start(capture_tx.clone()).await {
            warn!("{} capture failed to start: {}", self.source, error);
            let message = format!("capture start failed: {error}");
            if self
                .events
                .send(EngineEvent::Error {
                    source: self.source,
                    message,
                })
                .await
                .is_err()
            {
                debug!("engine event sink closed");
            }
            self.session.close().await;
            return Err(EngineError::Capture(error));
        }

        self.capture_tx = Some(capture_tx);
        self.forward_task = Some(self.spawn_forwarder(capture_rx));
        self.running = true;
        info!("{} pipeline started", self.source);
        Ok(())
    }

    /// Stop capture, drain the forwarder, and close the session. Safe to
    /// call repeatedly; only the first call after a start does anything.
    pub(crate) async fn stop(&mut self) {
        if !self.running {
            debug!("{} pipeline already stopped", self.source);
            return;
        }
        self.running = false;
        self.cancel.cancel();
        if let Some(restart) = self.restart_task.lock().take() {
            restart.abort();
        }
        self.capture.lock().await.stop().await;
        self.capture_tx = None;
        if let Some(task) = self.forward_task.take() {
            let _ = task.await;
        }
        self.session.close().await;
        info!("{} pipeline stopped", self.source);
    }

    /// Bounce capture after a default-device change, leaving the session
    /// connected. A restart already in flight is superseded.
    pub(crate) fn restart_capture(&self, settle: Duration, retry_delay: Duration) {
        let Some(capture_tx) = self.capture_tx.clone() else {
            debug!(
                "{}: ignoring device change, pipeline not running",
                self.source
            );
            return;
        };
        let source = self.source;
        let capture = Arc::clone(&self.capture);
        let events = self.events.clone();
        let cancel = self.cancel.clone();

        let mut slot = self.restart_task.lock();
        if let Some(previous) = slot.take() {
            debug!("{}: superseding in-flight capture restart", source);
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            info!("{}: restarting capture after device change", source);
            capture.lock().await.stop().await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(settle) => {}
            }
            match capture.lock().await.start(capture_tx.clone()).await {
                Ok(()) => {
                    info!("{}: capture restarted", source);
                    return;
                }
                Err(error) => {
                    warn!(
                        "{}: capture restart failed ({}), retrying in {:?}",
                        source, error, retry_delay
                    );
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(retry_delay) => {}
            }
            if let Err(error) = capture.lock().await.start(capture_tx).await {
                error!("{}: capture restart retry failed: {}", source, error);
                let message = format!("failed to restart capture after device change: {error}");
                if events
                    .send(EngineEvent::Error { source, message })
                    .await
                    .is_err()
                {
                    debug!("engine event sink closed");
                }
            } else {
                info!("{}: capture restarted on retry", source);
            }
        }));
    }

    fn spawn_forwarder(&self, mut capture_rx: mpsc::Receiver<PcmBuffer>) -> JoinHandle<()> {
        let source = self.source;
        let session = Arc::clone(&self.session);
        let cancel = self.cancel.clone();
        let mut converter = FormatConverter::new(self.target_sample_rate);
        let mut budget = ErrorBudget::new(self.budget_limit, self.budget_cooldown);

        tokio::spawn(async move {
            loop {
                let buffer = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = capture_rx.recv() => match received {
                        Some(buffer) => buffer,
                        None => break,
                    },
                };
                if budget.should_skip() {
                    trace!("{}: conversion cooling down, buffer dropped", source);
                    continue;
                }
                match converter.convert(buffer) {
                    Ok(converted) => {
                        budget.record_success();
                        if converted.frames > 0 {
                            session.send_audio(converted.payload).await;
                        }
                    }
                    Err(error) => {
                        budget.record_failure();
                        warn!(
                            "{}: buffer dropped, conversion failed: {} ({} consecutive)",
                            source,
                            error,
                            budget.consecutive_errors()
                        );
                    }
                }
            }
            debug!("{} forwarder stopped", source);
        })
    }
}
