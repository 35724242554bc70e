//! Conversion of arbitrary capture formats into the service format.
//!
//! The transcription service accepts exactly one shape: mono int16
//! little-endian at the configured rate. Capture taps deliver whatever the
//! hardware produces, so each buffer goes through up to three stages:
//!
//! 1. Decode int16 or float32 payloads to f32 samples.
//! 2. Downmix stereo to mono by averaging channel pairs.
//! 3. Resample to the target rate with a windowed-sinc filter, then
//!    quantize back to int16.
//!
//! Buffers already in the target shape skip all three stages and pass
//! through untouched.

use bytes::{BufMut, BytesMut};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use super::format::{ConversionError, PcmBuffer, PcmFormat, SampleFormat};

/// Sinc interpolation quality used by every conversion plan.
fn sinc_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// A resampling plan bound to one input format and chunk size.
///
/// The sinc resampler consumes fixed-size chunks, so the plan is only valid
/// while the source keeps delivering buffers of the same geometry.
struct ConversionPlan {
    input: PcmFormat,
    frames: usize,
    resampler: SincFixedIn<f32>,
    output: Vec<Vec<f32>>,
}

impl ConversionPlan {
    fn build(
        input: PcmFormat,
        frames: usize,
        target_rate: u32,
    ) -> Result<Self, ConversionError> {
        let ratio = target_rate as f64 / input.sample_rate as f64;
        let resampler = SincFixedIn::<f32>::new(ratio, 1.0, sinc_parameters(), frames, 1)?;
        let output = vec![vec![0.0; resampler.output_frames_max()]; 1];
        Ok(Self {
            input,
            frames,
            resampler,
            output,
        })
    }

    fn matches(&self, format: PcmFormat, frames: usize) -> bool {
        self.input == format && self.frames == frames
    }
}

/// Converts capture buffers into the fixed service format.
///
/// One converter serves one source pipeline. It caches the active resampling
/// plan and rebuilds it whenever the input geometry changes between calls, so
/// steady-state streams pay the filter construction cost once.
pub struct FormatConverter {
    target: PcmFormat,
    plan: Option<ConversionPlan>,
}

impl FormatConverter {
    /// A converter targeting mono int16 at `target_sample_rate`.
    pub fn new(target_sample_rate: u32) -> Self {
        Self {
            target: PcmFormat::service_target(target_sample_rate),
            plan: None,
        }
    }

    pub fn target(&self) -> PcmFormat {
        self.target
    }

    /// Convert one buffer to the service format.
    ///
    /// Zero-frame buffers yield an empty result. Failures leave the converter
    /// reusable; the caller decides whether to drop the buffer or give up.
    pub fn convert(&mut self, input: PcmBuffer) -> Result<PcmBuffer, ConversionError> {
        input.format.validate()?;
        if input.format.channels > 2 {
            return Err(ConversionError::UnsupportedFormat(format!(
                "{} channels; only mono and stereo input is supported",
                input.format.channels
            )));
        }
        if input.frames == 0 {
            return Ok(PcmBuffer::empty(self.target));
        }
        let expected = input.expected_payload_len();
        if input.payload.len() != expected {
            return Err(ConversionError::PayloadSizeMismatch {
                expected,
                actual: input.payload.len(),
            });
        }

        // Already the service shape: the payload moves through untouched.
        if input.format == self.target {
            return Ok(input);
        }

        let target = self.target;
        let mono = decode_mono(&input);

        if input.format.sample_rate == target.sample_rate {
            return Ok(quantize(&mono, target));
        }

        let plan = self.plan_for(input.format, input.frames)?;
        let (_, written) = plan
            .resampler
            .process_into_buffer(&[mono], &mut plan.output, None)?;
        Ok(quantize(&plan.output[0][..written], target))
    }

    fn plan_for(
        &mut self,
        format: PcmFormat,
        frames: usize,
    ) -> Result<&mut ConversionPlan, ConversionError> {
        let target_rate = self.target.sample_rate;
        if !matches!(&self.plan, Some(plan) if plan.matches(format, frames)) {
            debug!(
                "building conversion plan: {} Hz x{} frame chunks -> {} Hz",
                format.sample_rate, frames, target_rate
            );
            self.plan = Some(ConversionPlan::build(format, frames, target_rate)?);
        }
        Ok(self.plan.as_mut().expect("plan was just installed"))
    }
}

/// Decode the payload into mono f32 samples, averaging stereo pairs.
fn decode_mono(input: &PcmBuffer) -> Vec<f32> {
    let data = input.payload.as_ref();
    let frames = input.frames;
    let channels = input.format.channels as usize;
    let interleaved = input.format.interleaved;
    let mut mono = Vec::with_capacity(frames);

    match input.format.sample_format {
        SampleFormat::Int16 if channels == 1 => {
            for chunk in data.chunks_exact(2) {
                mono.push(i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0);
            }
        }
        SampleFormat::Float32 if channels == 1 => {
            for chunk in data.chunks_exact(4) {
                mono.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
        }
        SampleFormat::Int16 => {
            for frame in 0..frames {
                let left = read_i16(data, sample_index(interleaved, channels, frames, frame, 0));
                let right = read_i16(data, sample_index(interleaved, channels, frames, frame, 1));
                mono.push((left + right) * 0.5);
            }
        }
        SampleFormat::Float32 => {
            for frame in 0..frames {
                let left = read_f32(data, sample_index(interleaved, channels, frames, frame, 0));
                let right = read_f32(data, sample_index(interleaved, channels, frames, frame, 1));
                mono.push((left + right) * 0.5);
            }
        }
    }
    mono
}

/// Position of `(frame, channel)` in samples for either channel layout.
fn sample_index(
    interleaved: bool,
    channels: usize,
    frames: usize,
    frame: usize,
    channel: usize,
) -> usize {
    if interleaved {
        frame * channels + channel
    } else {
        channel * frames + frame
    }
}

fn read_i16(data: &[u8], index: usize) -> f32 {
    let offset = index * 2;
    i16::from_le_bytes([data[offset], data[offset + 1]]) as f32 / 32768.0
}

fn read_f32(data: &[u8], index: usize) -> f32 {
    let offset = index * 4;
    f32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Clamp to `[-1.0, 1.0]`, scale to int16, and pack little-endian.
fn quantize(samples: &[f32], target: PcmFormat) -> PcmBuffer {
    let mut payload = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        payload.put_i16_le((sample.clamp(-1.0, 1.0) * 32767.0) as i16);
    }
    PcmBuffer::new(target, samples.len(), payload.freeze())
}
