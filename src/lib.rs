//! Tapscribe: realtime transcription for microphone and system audio.
//!
//! Two capture sources feed independent streaming speech-to-text sessions
//! over WebSocket. Audio is converted to the service's wire format (mono
//! 16 kHz-class linear16 PCM) before upload, and recognition results come
//! back as a single tagged event stream.

pub mod audio;
pub mod config;
pub mod engine;
pub mod stt;

// Re-export commonly used items for convenience
pub use audio::{AudioSource, CaptureSource, FormatConverter, PcmBuffer, PcmFormat, SampleFormat};
pub use config::{AppConfig, ConfigError};
pub use engine::{AudioEngine, EngineConfig, EngineError, EngineEvent, EngineSources};
pub use stt::{ConnectionState, SessionError, SessionEvent, StreamConfig, StreamSession};
