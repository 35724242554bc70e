//! Audio capture, PCM conversion, and device monitoring.
//!
//! - [`format`]: PCM descriptors and buffers
//! - [`converter`]: normalization into the service format
//! - [`capture`]: the source abstraction the engine drives
//! - [`replay`]: WAV file playback as a capture source
//! - [`device`]: default-output-device change monitoring

pub mod capture;
pub mod converter;
pub mod device;
pub mod format;
pub mod replay;

pub use capture::{CaptureError, CaptureSource, NullSource};
pub use converter::FormatConverter;
pub use device::{DeviceChangeHandler, DeviceChangeMonitor};
pub use format::{ConversionError, PcmBuffer, PcmFormat, SampleFormat};
pub use replay::WavReplaySource;

use std::fmt;

/// Identity of one of the two live audio inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioSource {
    Microphone,
    SystemAudio,
}

impl AudioSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioSource::Microphone => "microphone",
            AudioSource::SystemAudio => "system_audio",
        }
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
