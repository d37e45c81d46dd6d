use crate::error::CaptureError;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// One captured block of microphone audio (normalized f32, mono)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in [-1, 1]; out-of-range values are clamped on conversion
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Capture order, starting at 0 for each capture run
    pub sequence: u64,
    /// Milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, sequence: u64) -> Self {
        let timestamp_ms = if sample_rate == 0 {
            0
        } else {
            sequence * samples.len() as u64 * 1000 / sample_rate as u64
        };
        Self { samples, sample_rate, sequence, timestamp_ms }
    }
}

/// Configuration for capture backends
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (will resample if needed)
    pub sample_rate: u32,
    /// Samples per block
    pub frame_samples: usize,
    /// Channel capacity between the capture callback and the session
    pub queue_depth: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz wire format
            frame_samples: 2048,
            queue_depth: 64,
        }
    }
}

impl CaptureConfig {
    /// Wall-clock length of one block
    pub fn frame_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.frame_samples as f64 / self.sample_rate as f64)
    }
}

/// Microphone capture backend trait
///
/// Implementations:
/// - File: paced playback of a WAV file (CLI, testing)
/// - Channel: blocks pushed by an embedding host that owns the device
///
/// A backend may be started again after `stop`; each session attempt
/// acquires the stream afresh.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Acquire the capture stream
    ///
    /// Fails with `CaptureError::PermissionDenied` when access is refused.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing and release the stream
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture source type
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// WAV file streamed in real time
    File(PathBuf),
    /// Host-fed blocks
    Channel,
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    /// Create a capture backend for a source.
    ///
    /// For `CaptureSource::Channel` the returned feed is how the host
    /// delivers blocks.
    pub fn create(
        source: CaptureSource,
        config: CaptureConfig,
    ) -> (Box<dyn CaptureBackend>, Option<super::channel::CaptureFeed>) {
        match source {
            CaptureSource::File(path) => {
                (Box::new(super::file::FileCapture::new(path, config)), None)
            }
            CaptureSource::Channel => {
                let (backend, feed) = super::channel::ChannelCapture::new(config);
                (Box::new(backend), Some(feed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timestamp_follows_sequence() {
        let frame = AudioFrame::new(vec![0.0; 1600], 16000, 3);
        assert_eq!(frame.timestamp_ms, 300);
    }

    #[test]
    fn test_frame_duration() {
        let config = CaptureConfig { frame_samples: 1600, ..Default::default() };
        assert_eq!(config.frame_duration(), std::time::Duration::from_millis(100));
    }
}
