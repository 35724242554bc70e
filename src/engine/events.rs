//! Source-tagged events delivered to the engine's consumer.

use serde_json::Value;

use crate::audio::AudioSource;
use crate::stt::SessionEvent;

/// Everything the two pipelines report, fanned into one stream.
///
/// Each variant carries the source it originated from, so a consumer can
/// split microphone and system-audio transcripts without tracking sessions
/// itself.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Connected { source: AudioSource },
    Disconnected { source: AudioSource },
    Error { source: AudioSource, message: String },
    Results { source: AudioSource, data: Value },
    Metadata { source: AudioSource, data: Value },
    Finalized { source: AudioSource, data: Value },
}

impl EngineEvent {
    /// Tag a session event with the pipeline it came from.
    pub fn from_session(source: AudioSource, event: SessionEvent) -> Self {
        match event {
            SessionEvent::Connected => Self::Connected { source },
            SessionEvent::Disconnected => Self::Disconnected { source },
            SessionEvent::Error(message) => Self::Error { source, message },
            SessionEvent::Results(data) => Self::Results { source, data },
            SessionEvent::Metadata(data) => Self::Metadata { source, data },
            SessionEvent::Finalized(data) => Self::Finalized { source, data },
        }
    }

    pub fn source(&self) -> AudioSource {
        match self {
            Self::Connected { source }
            | Self::Disconnected { source }
            | Self::Error { source, .. }
            | Self::Results { source, .. }
            | Self::Metadata { source, .. }
            | Self::Finalized { source, .. } => *source,
        }
    }
}
