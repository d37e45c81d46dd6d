//! Connection-credential providers
//!
//! A credential is a signed, short-lived, single-use WebSocket URL for one
//! agent. It is fetched afresh for every session attempt and consumed by the
//! connector, so `Credential` is not `Clone`.
//!
//! Providers:
//! - `HttpCredentialProvider`: asks the broker service (`POST /api/elevenlabs/signed-url`)
//! - `ElevenLabsCredentialProvider`: asks ElevenLabs directly with an API key
//! - `StaticCredentialProvider`: a fixed URL (local endpoints, tests)

pub(crate) mod elevenlabs;
mod http;

pub use elevenlabs::{ElevenLabsCredentialProvider, DEFAULT_BASE_URL as ELEVENLABS_BASE_URL};
pub use http::HttpCredentialProvider;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::protocol::WireStyle;

/// A signed connection URL and the wire style its issuer speaks
pub struct Credential {
    signed_url: String,
    wire_style: WireStyle,
    issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(signed_url: impl Into<String>, wire_style: WireStyle) -> Self {
        Self { signed_url: signed_url.into(), wire_style, issued_at: Utc::now() }
    }

    pub fn wire_style(&self) -> WireStyle {
        self.wire_style
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Consume the credential for a connection attempt.
    pub fn into_url(self) -> String {
        self.signed_url
    }
}

impl std::fmt::Debug for Credential {
    // The query string carries the signature; keep it out of logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let base = self.signed_url.split('?').next().unwrap_or_default();
        f.debug_struct("Credential")
            .field("signed_url", &format_args!("{}?…", base))
            .field("wire_style", &self.wire_style)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Source of connection credentials
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Fetch a fresh credential for `agent_id`.
    ///
    /// Non-success responses become `SessionError::Credential` carrying the
    /// provider's detail when it gave one.
    async fn fetch(&self, agent_id: &str) -> Result<Credential>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Always returns the same URL
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    url: String,
    wire_style: WireStyle,
}

impl StaticCredentialProvider {
    pub fn new(url: impl Into<String>, wire_style: WireStyle) -> Self {
        Self { url: url.into(), wire_style }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn fetch(&self, _agent_id: &str) -> Result<Credential> {
        Ok(Credential::new(self.url.clone(), self.wire_style))
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_signature() {
        let credential = Credential::new("wss://example.test/convai?token=secret", WireStyle::Json);
        let shown = format!("{:?}", credential);
        assert!(shown.contains("wss://example.test/convai"));
        assert!(!shown.contains("secret"));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticCredentialProvider::new("ws://127.0.0.1:1/ws", WireStyle::RawBinary);
        let credential = provider.fetch("agent").await.unwrap();
        assert_eq!(credential.wire_style(), WireStyle::RawBinary);
        assert_eq!(credential.into_url(), "ws://127.0.0.1:1/ws");
    }
}
