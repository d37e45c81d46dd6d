use serde::Deserialize;
use tracing::{info, warn};

use super::{Credential, CredentialProvider};
use crate::error::{Result, SessionError};
use crate::protocol::WireStyle;

/// Public ElevenLabs API
pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

#[derive(Deserialize)]
pub(crate) struct UpstreamSignedUrl {
    pub signed_url: String,
}

/// Build the upstream signed-URL request for `agent_id`.
pub(crate) fn signed_url_request(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    agent_id: &str,
) -> reqwest::RequestBuilder {
    client
        .get(format!(
            "{}/v1/convai/conversation/get-signed-url",
            base_url.trim_end_matches('/')
        ))
        .query(&[("agent_id", agent_id)])
        .header("xi-api-key", api_key)
}

/// Talks to ElevenLabs directly. Holds the API key, so only for trusted
/// processes (the broker, the CLI on an operator machine).
#[derive(Clone)]
pub struct ElevenLabsCredentialProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ElevenLabsCredentialProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(reqwest::Client::new(), DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self { client, base_url: base_url.into(), api_key: api_key.into() }
    }
}

impl std::fmt::Debug for ElevenLabsCredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsCredentialProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl CredentialProvider for ElevenLabsCredentialProvider {
    async fn fetch(&self, agent_id: &str) -> Result<Credential> {
        if self.api_key.is_empty() {
            return Err(SessionError::configuration("ElevenLabs API key not configured"));
        }

        info!("Requesting signed URL from ElevenLabs for agent: {}", agent_id);

        let response = signed_url_request(&self.client, &self.base_url, &self.api_key, agent_id)
            .send()
            .await
            .map_err(|e| SessionError::credential(None, format!("Failed to reach ElevenLabs: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            warn!("ElevenLabs refused signed URL ({}): {}", status, details);
            let details = details.trim();
            let message = if details.is_empty() {
                format!("Failed to get signed URL: {}", status.as_u16())
            } else {
                details.to_string()
            };
            return Err(SessionError::credential(Some(status.as_u16()), message));
        }

        let body: UpstreamSignedUrl = response.json().await.map_err(|e| {
            SessionError::credential(Some(status.as_u16()), format!("Invalid ElevenLabs response: {}", e))
        })?;

        // ElevenLabs conversational endpoints speak the JSON-enveloped style
        Ok(Credential::new(body.signed_url, WireStyle::Json))
    }

    fn name(&self) -> &str {
        "elevenlabs"
    }
}
