//! Realtime speech-to-text streaming.
//!
//! - [`config`]: stream parameters and WebSocket URL construction
//! - [`messages`]: wire-level control frames and inbound classification
//! - [`client`]: the [`StreamSession`] connection state machine

pub mod client;
pub mod config;
pub mod messages;

pub use client::StreamSession;
pub use config::StreamConfig;
pub use messages::{ControlMessage, InboundMessage, RecognitionResults};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by a transcription stream session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("API key is required")]
    MissingApiKey,

    #[error("session is already connecting or connected")]
    AlreadyActive,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection attempt timed out after {0} seconds")]
    ConnectTimeout(u64),
}

/// Connection lifecycle of a session.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> Closing -> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Closing => write!(f, "closing"),
        }
    }
}

/// Events a session reports to its registered handler.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The transport is up and the service accepts audio.
    Connected,
    /// The session reached `Disconnected`, cleanly or after `close()`.
    Disconnected,
    /// A failure the session could not recover from, or a rejected attempt.
    Error(String),
    /// A transcription results payload, raw as received.
    Results(serde_json::Value),
    /// Connection metadata from the service.
    Metadata(serde_json::Value),
    /// A results payload acknowledging a `Finalize` control message.
    Finalized(serde_json::Value),
}

/// Async handler invoked for every session event, in emission order.
pub type SessionEventHandler =
    Arc<dyn Fn(SessionEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
