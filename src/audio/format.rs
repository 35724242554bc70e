//! PCM format descriptors and sample buffers.
//!
//! Every buffer that moves through the capture and conversion stages carries
//! a [`PcmFormat`] describing its shape, so downstream code never has to
//! guess geometry from payload length.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Sample representation of raw PCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian integers.
    Int16,
    /// IEEE 754 32-bit floats, nominally in `[-1.0, 1.0]`.
    Float32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Float32 => 4,
        }
    }
}

/// Shape of a PCM stream: rate, channel count, representation, and layout.
///
/// `interleaved` distinguishes frame-major (`L R L R ...`) from planar
/// (`L L ... R R ...`) channel layout. It is meaningless for mono data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub interleaved: bool,
}

impl PcmFormat {
    /// Interleaved signed 16-bit format.
    pub fn int16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format: SampleFormat::Int16,
            interleaved: true,
        }
    }

    /// Interleaved 32-bit float format.
    pub fn float32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format: SampleFormat::Float32,
            interleaved: true,
        }
    }

    /// The fixed shape the transcription service consumes: mono int16
    /// little-endian at the given rate.
    pub fn service_target(sample_rate: u32) -> Self {
        Self::int16(sample_rate, 1)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    /// Check the invariants conversion relies on.
    pub fn validate(&self) -> Result<(), ConversionError> {
        if self.sample_rate == 0 {
            return Err(ConversionError::UnsupportedFormat(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(ConversionError::UnsupportedFormat(
                "channel count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// One capture callback's worth of raw PCM together with its format.
///
/// The payload is immutable once produced; ownership moves stage to stage
/// and cloning only bumps the refcount on the underlying bytes.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    pub format: PcmFormat,
    /// Number of sample frames (one sample per channel each).
    pub frames: usize,
    pub payload: Bytes,
}

impl PcmBuffer {
    pub fn new(format: PcmFormat, frames: usize, payload: Bytes) -> Self {
        Self {
            format,
            frames,
            payload,
        }
    }

    /// A buffer with no frames and no payload.
    pub fn empty(format: PcmFormat) -> Self {
        Self {
            format,
            frames: 0,
            payload: Bytes::new(),
        }
    }

    /// Payload length the declared geometry implies.
    pub fn expected_payload_len(&self) -> usize {
        self.frames * self.format.bytes_per_frame()
    }

    /// Pack interleaved int16 samples into a buffer.
    pub fn from_int16(format: PcmFormat, samples: &[i16]) -> Self {
        let mut payload = BytesMut::with_capacity(samples.len() * 2);
        for &sample in samples {
            payload.put_i16_le(sample);
        }
        let frames = samples.len() / format.channels.max(1) as usize;
        Self::new(format, frames, payload.freeze())
    }

    /// Pack interleaved float32 samples into a buffer.
    pub fn from_float32(format: PcmFormat, samples: &[f32]) -> Self {
        let mut payload = BytesMut::with_capacity(samples.len() * 4);
        for &sample in samples {
            payload.put_f32_le(sample);
        }
        let frames = samples.len() / format.channels.max(1) as usize;
        Self::new(format, frames, payload.freeze())
    }

    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.format.sample_rate as f64
    }
}

/// Errors raised while converting a buffer to the service format.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("payload is {actual} bytes but the declared geometry needs {expected}")]
    PayloadSizeMismatch { expected: usize, actual: usize },

    #[error("failed to build resampler: {0}")]
    ResamplerInit(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}
