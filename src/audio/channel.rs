// Host-fed capture backend
//
// For embeddings where something else owns the microphone (a browser bridge,
// a native audio callback): the host pushes fixed-size blocks through a
// `CaptureFeed` and the session consumes them like any other capture stream.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::backend::{AudioFrame, CaptureBackend, CaptureConfig};
use crate::error::CaptureError;

#[derive(Debug, Default)]
struct FeedState {
    tx: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    denied: AtomicBool,
    sequence: AtomicU64,
    dropped: AtomicU64,
}

impl FeedState {
    fn slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<AudioFrame>>> {
        self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Capture backend driven by a host
pub struct ChannelCapture {
    config: CaptureConfig,
    state: Arc<FeedState>,
}

/// Host side of a `ChannelCapture`
#[derive(Debug, Clone)]
pub struct CaptureFeed {
    sample_rate: u32,
    state: Arc<FeedState>,
}

impl ChannelCapture {
    pub fn new(config: CaptureConfig) -> (Self, CaptureFeed) {
        let state = Arc::new(FeedState::default());
        let feed = CaptureFeed { sample_rate: config.sample_rate, state: Arc::clone(&state) };
        (Self { config, state }, feed)
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ChannelCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.state.denied.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied);
        }

        let mut slot = self.state.slot();
        if slot.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }

        let (tx, rx) = mpsc::channel(self.config.queue_depth);
        *slot = Some(tx);
        self.state.sequence.store(0, Ordering::SeqCst);
        info!("Host-fed capture started");
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if self.state.slot().take().is_some() {
            info!("Host-fed capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.state.slot().is_some()
    }

    fn name(&self) -> &str {
        "channel"
    }
}

impl CaptureFeed {
    /// Deliver one block. Returns false when nobody is capturing or the
    /// session is not keeping up; the block is then dropped.
    pub fn push(&self, samples: Vec<f32>) -> bool {
        let slot = self.state.slot();
        let Some(tx) = slot.as_ref() else {
            return false;
        };

        let seq = self.state.sequence.fetch_add(1, Ordering::SeqCst);
        match tx.try_send(AudioFrame::new(samples, self.sample_rate, seq)) {
            Ok(()) => true,
            Err(e) => {
                self.state.dropped.fetch_add(1, Ordering::SeqCst);
                debug!("Capture block {} dropped: {}", seq, e);
                false
            }
        }
    }

    /// Report the user's permission decision; denial makes the next
    /// `start` fail.
    pub fn set_permission(&self, granted: bool) {
        self.state.denied.store(!granted, Ordering::SeqCst);
    }

    pub fn is_capturing(&self) -> bool {
        self.state.slot().is_some()
    }

    /// Blocks the session could not accept
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_before_start_is_dropped() {
        let (_capture, feed) = ChannelCapture::new(CaptureConfig::default());
        assert!(!feed.push(vec![0.0; 4]));
    }

    #[tokio::test]
    async fn test_blocks_arrive_in_order() {
        let (mut capture, feed) = ChannelCapture::new(CaptureConfig::default());
        let mut rx = capture.start().await.unwrap();

        assert!(feed.push(vec![0.1; 4]));
        assert!(feed.push(vec![0.2; 4]));

        assert_eq!(rx.recv().await.unwrap().sequence, 0);
        assert_eq!(rx.recv().await.unwrap().sequence, 1);

        capture.stop().await.unwrap();
        assert!(!capture.is_capturing());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_denied_permission() {
        let (mut capture, feed) = ChannelCapture::new(CaptureConfig::default());
        feed.set_permission(false);
        assert!(matches!(capture.start().await, Err(CaptureError::PermissionDenied)));

        feed.set_permission(true);
        assert!(capture.start().await.is_ok());
    }

    #[tokio::test]
    async fn test_restart_resets_sequence() {
        let (mut capture, feed) = ChannelCapture::new(CaptureConfig::default());
        let _rx = capture.start().await.unwrap();
        feed.push(vec![0.0; 4]);
        capture.stop().await.unwrap();

        let mut rx = capture.start().await.unwrap();
        feed.push(vec![0.0; 4]);
        assert_eq!(rx.recv().await.unwrap().sequence, 0);
    }
}
