use serde::{Deserialize, Serialize};

/// Close frame never received (connection dropped).
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Remote rejected the connection on policy grounds.
pub const POLICY_VIOLATION: u16 = 1008;
/// Remote hit an internal error.
pub const INTERNAL_ERROR: u16 = 1011;
/// Normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// How a transport closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    /// Whether a close frame was exchanged.
    pub clean: bool,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>, clean: bool) -> Self {
        Self { code, reason: reason.into(), clean }
    }

    /// Connection dropped without a close frame.
    pub fn abnormal() -> Self {
        Self::new(ABNORMAL_CLOSURE, "", false)
    }

    /// Local "end call".
    pub fn normal() -> Self {
        Self::new(NORMAL_CLOSURE, "Session ended", true)
    }

    pub fn category(&self) -> Option<CloseCategory> {
        CloseCategory::classify(self.code, self.clean)
    }
}

/// User-facing category of an abnormal closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseCategory {
    NetworkLost,
    PolicyRejected,
    ServerError,
    Interrupted,
}

impl CloseCategory {
    /// Map a close code to a category. `None` means the closure was clean.
    ///
    /// The three well-known codes win over the clean flag.
    pub fn classify(code: u16, clean: bool) -> Option<Self> {
        match code {
            ABNORMAL_CLOSURE => Some(Self::NetworkLost),
            POLICY_VIOLATION => Some(Self::PolicyRejected),
            INTERNAL_ERROR => Some(Self::ServerError),
            _ if !clean => Some(Self::Interrupted),
            _ => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::NetworkLost => "Connection lost - Please check your internet connection",
            Self::PolicyRejected => "Connection rejected - Policy violation",
            Self::ServerError => "Server error occurred",
            Self::Interrupted => "Connection interrupted unexpectedly",
        }
    }
}
