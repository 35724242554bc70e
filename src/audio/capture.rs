//! Capture source abstraction.
//!
//! The engine does not talk to audio hardware directly. The embedding
//! application supplies one [`CaptureSource`] per input (microphone tap,
//! system-audio tap, file replay) and the engine drives its lifecycle.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::format::PcmBuffer;

/// Errors raised by capture sources.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("capture source is already running")]
    AlreadyRunning,

    #[error("replay source error: {0}")]
    Replay(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A producer of raw PCM buffers.
///
/// Implementations deliver each capture callback's samples into the channel
/// handed to [`start`](CaptureSource::start). Live sources must use
/// `try_send` and drop the buffer when the slot is full (the pipeline is
/// still busy with the previous buffer); replay sources may block on the
/// channel instead.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Begin delivering buffers into `sink` until [`stop`](CaptureSource::stop)
    /// is called or the sink closes.
    async fn start(&mut self, sink: mpsc::Sender<PcmBuffer>) -> Result<(), CaptureError>;

    /// Stop delivering buffers. Idempotent.
    async fn stop(&mut self);

    /// Whether the source is currently delivering.
    fn is_capturing(&self) -> bool;
}

/// A source that produces nothing.
///
/// Stands in when one of the two engine inputs has no real tap behind it,
/// keeping both pipelines structurally identical.
#[derive(Debug, Default)]
pub struct NullSource {
    capturing: bool,
}

impl NullSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaptureSource for NullSource {
    fn name(&self) -> &str {
        "null"
    }

    async fn start(&mut self, _sink: mpsc::Sender<PcmBuffer>) -> Result<(), CaptureError> {
        if self.capturing {
            return Err(CaptureError::AlreadyRunning);
        }
        self.capturing = true;
        Ok(())
    }

    async fn stop(&mut self) {
        self.capturing = false;
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }
}
