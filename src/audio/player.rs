//! Inbound audio player
//!
//! Decodes arriving audio and schedules it on a virtual playback clock so
//! chunks play back-to-back in arrival order, whatever the network jitter:
//!
//! ```text
//! start  = max(now, cursor)
//! cursor = start + duration
//! ```
//!
//! The cursor only moves forward during a session; it is reset to "now" when
//! a session starts and when it is torn down.

use base64::Engine;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::decode;
use super::pcm;
use super::sink::PlaybackSink;
use crate::error::DecodeError;

/// Where one chunk sits on the playback timeline (relative to clock start)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledChunk {
    pub start: Duration,
    pub end: Duration,
}

impl ScheduledChunk {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Monotonic scheduling cursor
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    origin: Instant,
    cursor: Duration,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self { origin: Instant::now(), cursor: Duration::ZERO }
    }

    /// Time since the clock was (re)started
    pub fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    /// End of everything scheduled so far
    pub fn cursor(&self) -> Duration {
        self.cursor
    }

    /// Schedule a chunk of `duration` that arrived at `now`.
    pub fn schedule_at(&mut self, now: Duration, duration: Duration) -> ScheduledChunk {
        let start = now.max(self.cursor);
        let end = start + duration;
        self.cursor = end;
        ScheduledChunk { start, end }
    }

    pub fn schedule(&mut self, duration: Duration) -> ScheduledChunk {
        let now = self.now();
        self.schedule_at(now, duration)
    }

    /// Restart at "now" with nothing scheduled.
    pub fn reset(&mut self) {
        self.origin = Instant::now();
        self.cursor = Duration::ZERO;
    }
}

const LEVEL_SMOOTHING: f32 = 0.8;

/// Playback energy meter for visualization
///
/// Tracks the RMS of scheduled chunks and reports the one playing at the
/// sampled instant, smoothed across samples.
#[derive(Debug, Default)]
pub struct LevelMeter {
    pending: VecDeque<(ScheduledChunk, f32)>,
    smoothed: f32,
}

impl LevelMeter {
    pub fn record(&mut self, chunk: ScheduledChunk, samples: &[f32]) {
        // Full-scale sine reads as 1.0
        let level = (pcm::rms(samples) * std::f32::consts::SQRT_2).min(1.0);
        self.pending.push_back((chunk, level));
    }

    /// Smoothed level in [0, 1] at `now`.
    pub fn sample(&mut self, now: Duration) -> f32 {
        while self.pending.front().is_some_and(|(c, _)| c.end <= now) {
            self.pending.pop_front();
        }
        let target = match self.pending.front() {
            Some((chunk, level)) if chunk.start <= now => *level,
            _ => 0.0,
        };
        self.smoothed = self.smoothed * LEVEL_SMOOTHING + target * (1.0 - LEVEL_SMOOTHING);
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.smoothed = 0.0;
    }
}

/// Decodes and schedules inbound audio for one session attempt
pub struct InboundPlayer {
    clock: PlaybackClock,
    sink: Box<dyn PlaybackSink>,
    pcm_rate: u32,
    meter: LevelMeter,
}

impl InboundPlayer {
    /// `pcm_rate` applies to raw PCM payloads until renegotiated.
    pub fn new(sink: Box<dyn PlaybackSink>, pcm_rate: u32) -> Self {
        Self { clock: PlaybackClock::new(), sink, pcm_rate, meter: LevelMeter::default() }
    }

    pub fn set_pcm_rate(&mut self, rate: u32) {
        if rate > 0 && rate != self.pcm_rate {
            debug!("Inbound PCM rate renegotiated: {} -> {}", self.pcm_rate, rate);
            self.pcm_rate = rate;
        }
    }

    pub fn pcm_rate(&self) -> u32 {
        self.pcm_rate
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    /// JSON-enveloped style: base64 of 16-bit PCM.
    pub fn play_pcm_base64(&mut self, payload: &str) -> Result<ScheduledChunk, DecodeError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
        self.play_pcm(&bytes)
    }

    /// 16-bit little-endian PCM at the negotiated rate.
    pub fn play_pcm(&mut self, bytes: &[u8]) -> Result<ScheduledChunk, DecodeError> {
        let samples = pcm::decode_pcm16(bytes).ok_or(DecodeError::OddLength(bytes.len()))?;
        Ok(self.schedule(samples, self.pcm_rate))
    }

    /// Raw-binary style: a complete, self-describing clip.
    pub fn play_clip(&mut self, bytes: &[u8]) -> Result<ScheduledChunk, DecodeError> {
        let clip = decode::decode_clip(bytes)?;
        Ok(self.schedule(clip.samples, clip.sample_rate))
    }

    fn schedule(&mut self, samples: Vec<f32>, sample_rate: u32) -> ScheduledChunk {
        let duration = Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64);
        let chunk = self.clock.schedule(duration);

        if let Err(e) = self.sink.play(&chunk, &samples, sample_rate) {
            warn!("Playback sink {} rejected chunk: {:#}", self.sink.name(), e);
        }
        self.meter.record(chunk, &samples);

        debug!(
            "Scheduled {:.0}ms of audio at {:.3}s",
            chunk.duration().as_secs_f64() * 1000.0,
            chunk.start.as_secs_f64()
        );
        chunk
    }

    /// Current playback level for visualization
    pub fn level(&mut self) -> f32 {
        let now = self.clock.now();
        self.meter.sample(now)
    }

    /// Release the output device.
    pub fn release(&mut self) -> anyhow::Result<()> {
        self.sink.release()
    }

    pub fn reset_clock(&mut self) {
        self.clock.reset();
        self.meter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::MemorySink;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_burst_is_back_to_back() {
        let mut clock = PlaybackClock::new();
        let a = clock.schedule_at(ms(10), ms(100));
        let b = clock.schedule_at(ms(12), ms(100));
        let c = clock.schedule_at(ms(13), ms(50));

        assert_eq!(a, ScheduledChunk { start: ms(10), end: ms(110) });
        assert_eq!(b.start, a.end);
        assert_eq!(c.start, b.end);
        assert_eq!(clock.cursor(), ms(260));
    }

    #[test]
    fn test_late_chunk_starts_at_arrival() {
        let mut clock = PlaybackClock::new();
        let a = clock.schedule_at(ms(0), ms(100));
        let b = clock.schedule_at(ms(500), ms(100));
        assert_eq!(a.end, ms(100));
        assert_eq!(b.start, ms(500));
    }

    #[test]
    fn test_no_overlap_no_negative_scheduling() {
        let mut clock = PlaybackClock::new();
        let arrivals = [0u64, 5, 5, 300, 301, 302, 900, 901, 1500, 1500];
        let durations = [120u64, 80, 200, 10, 10, 400, 40, 40, 1, 300];

        let mut previous: Option<ScheduledChunk> = None;
        for (arrival, duration) in arrivals.iter().zip(durations.iter()) {
            let chunk = clock.schedule_at(ms(*arrival), ms(*duration));
            assert!(chunk.start >= ms(*arrival));
            if let Some(prev) = previous {
                assert!(chunk.start >= prev.end);
            }
            previous = Some(chunk);
        }
    }

    #[test]
    fn test_reset_clears_cursor() {
        let mut clock = PlaybackClock::new();
        clock.schedule_at(ms(0), ms(1000));
        clock.reset();
        assert_eq!(clock.cursor(), Duration::ZERO);
    }

    #[test]
    fn test_bad_payload_does_not_move_cursor() {
        let sink = MemorySink::new();
        let mut player = InboundPlayer::new(Box::new(sink.clone()), 16000);

        assert!(player.play_pcm(&[0, 0, 0]).is_err());
        assert!(player.play_pcm_base64("***not base64***").is_err());
        assert!(player.play_clip(&[1, 2, 3, 4]).is_err());
        assert_eq!(player.clock().cursor(), Duration::ZERO);

        let chunk = player.play_pcm(&vec![0u8; 3200]).unwrap();
        assert_eq!(chunk.duration(), ms(100));
        assert_eq!(sink.played().len(), 1);
    }

    #[test]
    fn test_renegotiated_rate() {
        let mut player = InboundPlayer::new(Box::new(MemorySink::new()), 16000);
        player.set_pcm_rate(22050);
        let chunk = player.play_pcm(&vec![0u8; 44100]).unwrap();
        assert_eq!(chunk.duration(), ms(1000));
    }

    #[test]
    fn test_level_meter_tracks_playing_chunk() {
        let mut meter = LevelMeter::default();
        let loud = vec![0.5f32; 1600];
        meter.record(ScheduledChunk { start: ms(0), end: ms(100) }, &loud);

        let during = meter.sample(ms(50));
        assert!(during > 0.0);

        // Decays once the chunk has finished
        let mut after = meter.sample(ms(200));
        for _ in 0..50 {
            after = meter.sample(ms(200));
        }
        assert!(after < 0.01);
    }
}
