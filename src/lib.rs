pub mod audio;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod nats;
pub mod protocol;
pub mod session;
pub mod transport;

pub use audio::{
    AudioFile, AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureFeed,
    CaptureSource, InboundPlayer, MemorySink, NullSink, OutboundPump, PlaybackClock, PlaybackSink,
    WavSink,
};
pub use config::Config;
pub use credentials::{
    Credential, CredentialProvider, ElevenLabsCredentialProvider, HttpCredentialProvider,
    StaticCredentialProvider,
};
pub use error::{CaptureError, DecodeError, SessionError, TransportError};
pub use http::{create_router, AppState};
pub use nats::{EventPublisher, SessionEventMessage};
pub use protocol::{CloseCategory, CloseInfo, WireStyle};
pub use session::{
    AgentProfile, ConnectionState, SessionConfig, SessionEvent, SessionStats, Speaker,
    TeardownReport, TranscriptLine, VoiceSession,
};
pub use transport::{Connector, MemoryConnector, Transport, WsConnector};
