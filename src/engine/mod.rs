//! Dual-source transcription engine.
//!
//! Runs two fully independent pipelines, one per input:
//!
//! ```text
//! microphone tap ---> convert ---> session A ---+
//!                                               +--> engine events
//! system tap -------> convert ---> session B ---+
//! ```
//!
//! The pipelines share nothing but the event sink. A stall, disconnect, or
//! conversion failure on one side never touches the other. Default-output-
//! device changes bounce the system-audio capture while its session stays
//! connected.

mod budget;
mod events;
mod pipeline;

pub use budget::{ErrorBudget, DEFAULT_ERROR_COOLDOWN, DEFAULT_MAX_CONSECUTIVE_ERRORS};
pub use events::EngineEvent;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::audio::{
    AudioSource, CaptureError, CaptureSource, DeviceChangeHandler, DeviceChangeMonitor,
};
use crate::stt::{SessionError, StreamConfig};
use pipeline::SourcePipeline;

/// Capacity of the fan-in event channel handed to the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Engine tunables beyond the per-session stream settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub stream: StreamConfig,
    /// Consecutive conversion failures before a pipeline cools down.
    pub max_consecutive_errors: u32,
    pub error_cooldown: Duration,
    /// Pause between stopping and restarting capture on a device change.
    pub restart_settle_delay: Duration,
    /// Pause before the single restart retry.
    pub restart_retry_delay: Duration,
}

impl EngineConfig {
    pub fn new(stream: StreamConfig) -> Self {
        Self {
            stream,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            error_cooldown: DEFAULT_ERROR_COOLDOWN,
            restart_settle_delay: Duration::from_millis(500),
            restart_retry_delay: Duration::from_secs(2),
        }
    }
}

/// Engine-level failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("API key is required")]
    MissingApiKey,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Capture inputs handed to the engine at construction.
///
/// `device_events` is the feed from the host's default-output-device
/// property listener; identifiers arriving there drive system-audio capture
/// restarts.
pub struct EngineSources {
    pub microphone: Box<dyn CaptureSource>,
    pub system_audio: Box<dyn CaptureSource>,
    pub device_events: mpsc::Receiver<String>,
}

/// Owns both pipelines and the device monitor.
pub struct AudioEngine {
    config: EngineConfig,
    microphone: Arc<Mutex<SourcePipeline>>,
    system_audio: Arc<Mutex<SourcePipeline>>,
    monitor: DeviceChangeMonitor,
    running: bool,
}

impl AudioEngine {
    /// Build the engine and the event stream its consumer reads.
    pub fn new(
        config: EngineConfig,
        sources: EngineSources,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let microphone = Arc::new(Mutex::new(SourcePipeline::new(
            AudioSource::Microphone,
            sources.microphone,
            events_tx.clone(),
            &config,
        )));
        let system_audio = Arc::new(Mutex::new(SourcePipeline::new(
            AudioSource::SystemAudio,
            sources.system_audio,
            events_tx,
            &config,
        )));
        let monitor = DeviceChangeMonitor::new(sources.device_events);
        (
            Self {
                config,
                microphone,
                system_audio,
                monitor,
                running: false,
            },
            events_rx,
        )
    }

    /// Start both pipelines and the device monitor.
    ///
    /// Only a missing API key fails the call; individual pipeline failures
    /// surface as error events so one bad input never blocks the other.
    /// No-op when already running.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.running {
            debug!("engine already running");
            return Ok(());
        }
        if self.config.stream.api_key.trim().is_empty() {
            return Err(EngineError::MissingApiKey);
        }
        info!("starting audio engine");

        let pipelines = [
            (&self.microphone, AudioSource::Microphone),
            (&self.system_audio, AudioSource::SystemAudio),
        ];
        for (pipeline, source) in pipelines {
            if let Err(error) = pipeline.lock().await.start().await {
                warn!("{} pipeline failed to start: {}", source, error);
            }
        }

        // The system tap follows the default output device, so device
        // changes bounce that pipeline's capture.
        let system_audio = Arc::clone(&self.system_audio);
        let settle = self.config.restart_settle_delay;
        let retry = self.config.restart_retry_delay;
        let handler: DeviceChangeHandler = Arc::new(move |device_id: String| {
            let system_audio = Arc::clone(&system_audio);
            Box::pin(async move {
                debug!("routing device change ({}) to system audio", device_id);
                system_audio.lock().await.restart_capture(settle, retry);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        self.monitor.start(handler);

        self.running = true;
        Ok(())
    }

    /// Stop the monitor, both captures, and both sessions. Safe to call
    /// repeatedly; extra calls are silent.
    pub async fn stop(&mut self) {
        if !self.running {
            debug!("engine already stopped");
            return;
        }
        info!("stopping audio engine");
        self.monitor.stop().await;
        let mut microphone = self.microphone.lock().await;
        let mut system_audio = self.system_audio.lock().await;
        futures::future::join(microphone.stop(), system_audio.stop()).await;
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
