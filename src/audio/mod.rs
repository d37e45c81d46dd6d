pub mod backend;
pub mod channel;
pub mod decode;
pub mod file;
pub mod pcm;
pub mod player;
pub mod pump;
pub mod sink;

pub use backend::{AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureSource};
pub use channel::{CaptureFeed, ChannelCapture};
pub use decode::{decode_clip, DecodedClip};
pub use file::{AudioFile, FileCapture};
pub use player::{InboundPlayer, LevelMeter, PlaybackClock, ScheduledChunk};
pub use pump::{OutboundPump, PumpOutcome};
pub use sink::{MemorySink, NullSink, PlaybackSink, PlayedChunk, WavSink};
