//! Programmatically generated audio test data.
//!
//! Generated inputs keep tests reproducible without checked-in binary files
//! and give precise control over rate, layout, and content.

#![allow(dead_code)]

use std::f32::consts::TAU;
use std::path::Path;

/// Silence as raw little-endian int16 bytes.
pub fn silence_bytes(frames: usize) -> Vec<u8> {
    vec![0u8; frames * 2]
}

/// A mono sine tone. Amplitude is a fraction of full scale.
pub fn sine_i16(frames: usize, sample_rate: u32, frequency: f32, amplitude: f32) -> Vec<i16> {
    let max_amplitude = amplitude * i16::MAX as f32;
    let angular = TAU * frequency / sample_rate as f32;
    (0..frames)
        .map(|n| ((angular * n as f32).sin() * max_amplitude) as i16)
        .collect()
}

/// The same tone on both channels, interleaved float32.
pub fn sine_f32_stereo(
    frames: usize,
    sample_rate: u32,
    frequency: f32,
    amplitude: f32,
) -> Vec<f32> {
    let angular = TAU * frequency / sample_rate as f32;
    (0..frames * 2)
        .map(|n| (angular * (n / 2) as f32).sin() * amplitude)
        .collect()
}

/// Int16 samples as the little-endian bytes the service consumes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Write a mono int16 WAV holding a 440 Hz tone, for replay-driven tests.
pub fn write_tone_wav(path: &Path, sample_rate: u32, frames: usize) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    for sample in sine_i16(frames, sample_rate, 440.0, 0.4) {
        writer.write_sample(sample).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}
