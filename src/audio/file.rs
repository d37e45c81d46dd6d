use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioFrame, CaptureBackend, CaptureConfig};
use super::pcm;
use crate::error::CaptureError;

/// A WAV file loaded as normalized samples
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int if spec.bits_per_sample == 16 => reader
                .into_samples::<i16>()
                .map(|s| s.map(pcm::i16_to_f32))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono samples at `target_rate`
    pub fn to_mono(&self, target_rate: u32) -> Vec<f32> {
        let mono = pcm::downmix_to_mono(&self.samples, self.channels);
        pcm::resample_linear(&mono, self.sample_rate, target_rate)
    }
}

/// Capture backend that streams a WAV file as if it were a microphone
///
/// Blocks are emitted at the file's real-time cadence so the session sees
/// the same timing a live device would produce.
pub struct FileCapture {
    path: PathBuf,
    config: CaptureConfig,
    task: Option<JoinHandle<()>>,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>, config: CaptureConfig) -> Self {
        Self { path: path.into(), config, task: None }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.is_capturing() {
            return Err(CaptureError::AlreadyCapturing);
        }
        self.task = None;

        let audio = AudioFile::open(&self.path)
            .map_err(|e| CaptureError::Unavailable(format!("{:#}", e)))?;
        let samples = audio.to_mono(self.config.sample_rate);

        let (tx, rx) = mpsc::channel(self.config.queue_depth);
        let frame_samples = self.config.frame_samples.max(1);
        let sample_rate = self.config.sample_rate;
        let period = self.config.frame_duration();

        info!(
            "Starting file capture from {} ({} blocks of {} samples)",
            audio.path,
            samples.len().div_ceil(frame_samples),
            frame_samples
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            for (seq, block) in samples.chunks(frame_samples).enumerate() {
                ticker.tick().await;
                let mut block = block.to_vec();
                // Pad the tail so every block has the fixed size
                block.resize(frame_samples, 0.0);
                if tx.send(AudioFrame::new(block, sample_rate, seq as u64)).await.is_err() {
                    break;
                }
            }
            info!("File capture finished");
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("File capture task failed: {}", e);
                }
            }
            info!("File capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "file"
    }
}
