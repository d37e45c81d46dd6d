use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Negotiator state machine
///
/// `Idle → Connecting → Connected → Disconnected`; a failed attempt goes
/// back from `Connecting` to `Idle`, and `Disconnected` may start again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    /// Whether a start request is allowed from here
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// The state shared between capture, transport handlers and observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub muted: bool,
    /// Session-ready observed on the current transport
    pub ready: bool,
}

/// Owner of the shared snapshot
///
/// Writers replace the whole snapshot under the watch lock, so a reader
/// never sees a half-applied update.
#[derive(Debug)]
pub struct SharedState {
    tx: watch::Sender<SessionSnapshot>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(SessionSnapshot::default())
    }
}

impl SharedState {
    pub fn new(initial: SessionSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Apply `f` atomically; returns the snapshots before and after.
    pub fn update<F>(&self, f: F) -> (SessionSnapshot, SessionSnapshot)
    where
        F: FnOnce(&mut SessionSnapshot),
    {
        let mut before = SessionSnapshot::default();
        let mut after = SessionSnapshot::default();
        self.tx.send_if_modified(|snapshot| {
            before = *snapshot;
            f(snapshot);
            after = *snapshot;
            before != after
        });
        (before, after)
    }
}
