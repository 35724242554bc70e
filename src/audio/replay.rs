//! WAV file replay capture source.
//!
//! Feeds pre-recorded audio through the pipeline the way a live tap would:
//! fixed-duration buffers, one format, steady cadence. Used by the CLI to
//! transcribe files and by integration tests to drive the engine without
//! hardware.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hound::{SampleFormat as WavSampleFormat, WavReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use super::capture::{CaptureError, CaptureSource};
use super::format::{PcmBuffer, PcmFormat, SampleFormat};

/// Duration of each replayed buffer in milliseconds.
const CHUNK_MS: u64 = 100;

/// Replays a WAV file as a stream of capture buffers.
///
/// Each `start` begins again from the top of the file, which is what the
/// engine's device-change recovery expects from a restarted source.
pub struct WavReplaySource {
    path: PathBuf,
    paced: bool,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavReplaySource {
    /// Replay `path` at recorded cadence, one buffer per 100ms.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            paced: true,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Replay as fast as the pipeline accepts buffers.
    pub fn unpaced(path: impl AsRef<Path>) -> Self {
        Self {
            paced: false,
            ..Self::new(path)
        }
    }

    /// Shared view of the capture state. Flips to false when the file runs
    /// out, so a caller can tell replay completion apart from a stop it
    /// requested itself.
    pub fn capturing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.capturing)
    }
}

#[async_trait]
impl CaptureSource for WavReplaySource {
    fn name(&self) -> &str {
        "wav-replay"
    }

    async fn start(&mut self, sink: mpsc::Sender<PcmBuffer>) -> Result<(), CaptureError> {
        if self.capturing.load(Ordering::Acquire) {
            return Err(CaptureError::AlreadyRunning);
        }

        let reader = WavReader::open(&self.path)?;
        let spec = reader.spec();
        let format = match (spec.sample_format, spec.bits_per_sample) {
            (WavSampleFormat::Int, 16) => PcmFormat::int16(spec.sample_rate, spec.channels),
            (WavSampleFormat::Float, 32) => PcmFormat::float32(spec.sample_rate, spec.channels),
            (other, bits) => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "unsupported wav encoding {:?}/{} bits in {}",
                    other,
                    bits,
                    self.path.display()
                )));
            }
        };

        // Replay files are short; decode everything up front so the task
        // never does blocking IO.
        let payload: Vec<u8> = match format.sample_format {
            SampleFormat::Int16 => {
                let samples: Vec<i16> = reader.into_samples().collect::<Result<_, _>>()?;
                samples.iter().flat_map(|s| s.to_le_bytes()).collect()
            }
            SampleFormat::Float32 => {
                let samples: Vec<f32> = reader.into_samples().collect::<Result<_, _>>()?;
                samples.iter().flat_map(|s| s.to_le_bytes()).collect()
            }
        };

        info!(
            "replaying {} ({} Hz, {} ch, {} bytes)",
            self.path.display(),
            format.sample_rate,
            format.channels,
            payload.len()
        );

        let frames_per_chunk = (format.sample_rate as u64 * CHUNK_MS / 1000).max(1) as usize;
        let bytes_per_frame = format.bytes_per_frame();
        let chunk_bytes = frames_per_chunk * bytes_per_frame;
        let paced = self.paced;
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::Release);

        self.task = Some(tokio::spawn(async move {
            let mut offset = 0usize;
            while capturing.load(Ordering::Acquire) && offset < payload.len() {
                let end = (offset + chunk_bytes).min(payload.len());
                let frames = (end - offset) / bytes_per_frame;
                let chunk = Bytes::copy_from_slice(&payload[offset..end]);
                let buffer = PcmBuffer::new(format, frames, chunk);
                if sink.send(buffer).await.is_err() {
                    debug!("replay sink closed, stopping");
                    break;
                }
                offset = end;
                if paced {
                    sleep(Duration::from_millis(CHUNK_MS)).await;
                }
            }
            capturing.store(false, Ordering::Release);
            debug!("wav replay finished");
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        self.capturing.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use tempfile::NamedTempFile;

    fn write_test_wav(sample_rate: u32, channels: u16, frames: usize) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: WavSampleFormat::Int,
        };
        let mut writer = WavWriter::create(file.path(), spec).unwrap();
        for i in 0..frames * channels as usize {
            writer.write_sample((i % 1000) as i16).unwrap();
        }
        writer.finalize().unwrap();
        file
    }

    #[tokio::test]
    async fn test_replay_delivers_all_frames() {
        let file = write_test_wav(16000, 1, 4000);
        let mut source = WavReplaySource::unpaced(file.path());
        let (tx, mut rx) = mpsc::channel(64);

        source.start(tx).await.unwrap();

        let mut total_frames = 0usize;
        while let Some(buffer) = rx.recv().await {
            assert_eq!(buffer.format.sample_rate, 16000);
            assert_eq!(buffer.payload.len(), buffer.expected_payload_len());
            total_frames += buffer.frames;
        }
        assert_eq!(total_frames, 4000);
        assert!(!source.is_capturing());
    }

    #[tokio::test]
    async fn test_replay_chunks_are_100ms() {
        let file = write_test_wav(48000, 2, 9600);
        let mut source = WavReplaySource::unpaced(file.path());
        let (tx, mut rx) = mpsc::channel(64);

        source.start(tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.frames, 4800);
        assert_eq!(first.format.channels, 2);
    }

    #[tokio::test]
    async fn test_replay_restarts_from_the_top() {
        let file = write_test_wav(16000, 1, 1600);
        let mut source = WavReplaySource::unpaced(file.path());

        let (tx, mut rx) = mpsc::channel(64);
        source.start(tx).await.unwrap();
        let first_run = rx.recv().await.unwrap();
        source.stop().await;

        let (tx, mut rx) = mpsc::channel(64);
        source.start(tx).await.unwrap();
        let second_run = rx.recv().await.unwrap();
        source.stop().await;

        assert_eq!(first_run.payload, second_run.payload);
    }

    #[tokio::test]
    async fn test_missing_file_fails_start() {
        let mut source = WavReplaySource::new("/nonexistent/audio.wav");
        let (tx, _rx) = mpsc::channel(1);
        assert!(source.start(tx).await.is_err());
        assert!(!source.is_capturing());
    }
}
