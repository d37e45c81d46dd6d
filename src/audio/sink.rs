// Playback sinks
//
// The player decides *when* each chunk plays (see `player::PlaybackClock`);
// a sink is told the scheduled start and renders the samples there. Sinks are
// the "audio device handle" of a session and are released on teardown.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

use super::pcm;
use super::player::ScheduledChunk;

/// Output device abstraction
pub trait PlaybackSink: Send {
    /// Render `samples` (mono, `sample_rate`) starting at `chunk.start`.
    fn play(&mut self, chunk: &ScheduledChunk, samples: &[f32], sample_rate: u32) -> Result<()>;

    /// Release the device. Further `play` calls may fail.
    fn release(&mut self) -> Result<()>;

    /// Get sink name for logging
    fn name(&self) -> &str;
}

/// Records scheduled playback into a WAV file, silence-filling gaps
///
/// Because the clock never schedules overlapping chunks, writing
/// sequentially with padding reproduces the exact timeline a speaker would
/// have played.
pub struct WavSink {
    path: PathBuf,
    sample_rate: u32,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    written: u64,
}

impl WavSink {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        info!("Recording playback to {}", path.display());

        Ok(Self { path, sample_rate, writer: Some(writer), written: 0 })
    }

    fn offset_samples(&self, at: Duration) -> u64 {
        (at.as_secs_f64() * self.sample_rate as f64).round() as u64
    }
}

impl PlaybackSink for WavSink {
    fn play(&mut self, chunk: &ScheduledChunk, samples: &[f32], sample_rate: u32) -> Result<()> {
        let start = self.offset_samples(chunk.start);
        let resampled = pcm::resample_linear(samples, sample_rate, self.sample_rate);

        let writer = self.writer.as_mut().context("WAV sink already released")?;

        for _ in self.written..start {
            writer.write_sample(0i16).context("Failed to write sample to WAV")?;
        }
        self.written = self.written.max(start);

        for &s in &resampled {
            writer.write_sample(pcm::f32_to_i16(s)).context("Failed to write sample to WAV")?;
        }
        self.written += resampled.len() as u64;

        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
            info!(
                "Playback recording finalized: {} ({:.1}s)",
                self.path.display(),
                self.written as f64 / self.sample_rate as f64
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "wav"
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("Failed to finalize WAV writer on drop: {}", e);
        }
    }
}

/// One entry recorded by `MemorySink`
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedChunk {
    pub start: Duration,
    pub end: Duration,
    pub sample_count: usize,
    pub sample_rate: u32,
}

/// Keeps the schedule in memory; used by embedding hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    played: Arc<Mutex<Vec<PlayedChunk>>>,
    released: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<PlayedChunk> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn is_released(&self) -> bool {
        self.released.lock().map(|r| *r).unwrap_or(false)
    }
}

impl PlaybackSink for MemorySink {
    fn play(&mut self, chunk: &ScheduledChunk, samples: &[f32], sample_rate: u32) -> Result<()> {
        let mut played = self
            .played
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink lock poisoned"))?;
        played.push(PlayedChunk {
            start: chunk.start,
            end: chunk.end,
            sample_count: samples.len(),
            sample_rate,
        });
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let mut released = self
            .released
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink lock poisoned"))?;
        *released = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Discards audio.
#[derive(Debug, Default)]
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn play(&mut self, _chunk: &ScheduledChunk, _samples: &[f32], _sample_rate: u32) -> Result<()> {
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(start_ms: u64, end_ms: u64) -> ScheduledChunk {
        ScheduledChunk {
            start: Duration::from_millis(start_ms),
            end: Duration::from_millis(end_ms),
        }
    }

    #[test]
    fn test_wav_sink_pads_gaps() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("playback.wav");

        let mut sink = WavSink::create(&path, 16000)?;
        // 100ms of audio at t=0, then 100ms more at t=200ms
        sink.play(&chunk(0, 100), &vec![0.5; 1600], 16000)?;
        sink.play(&chunk(200, 300), &vec![0.5; 1600], 16000)?;
        sink.release()?;

        let reader = hound::WavReader::open(&path)?;
        let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
        assert_eq!(samples.len(), 4800);
        assert!(samples[1600..3200].iter().all(|&s| s == 0));
        assert!(samples[3200] > 0);
        Ok(())
    }

    #[test]
    fn test_wav_sink_release_is_idempotent() -> Result<()> {
        let dir = TempDir::new()?;
        let mut sink = WavSink::create(dir.path().join("a.wav"), 16000)?;
        sink.release()?;
        sink.release()?;
        assert!(sink.play(&chunk(0, 1), &[0.0], 16000).is_err());
        Ok(())
    }

    #[test]
    fn test_memory_sink_records() -> Result<()> {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        handle.play(&chunk(0, 50), &[0.0; 800], 16000)?;
        handle.release()?;

        assert_eq!(sink.played().len(), 1);
        assert_eq!(sink.played()[0].sample_count, 800);
        assert!(sink.is_released());
        Ok(())
    }
}
