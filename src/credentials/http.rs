use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Credential, CredentialProvider};
use crate::error::{Result, SessionError};
use crate::protocol::WireStyle;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlRequest<'a> {
    agent_id: &'a str,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedUrl", alias = "signed_url")]
    signed_url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Fetches credentials from the broker service
#[derive(Debug, Clone)]
pub struct HttpCredentialProvider {
    client: reqwest::Client,
    endpoint: String,
    wire_style: WireStyle,
}

impl HttpCredentialProvider {
    /// `endpoint` is the full signed-URL route, e.g.
    /// `http://localhost:3000/api/elevenlabs/signed-url`.
    pub fn new(endpoint: impl Into<String>, wire_style: WireStyle) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint, wire_style)
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        wire_style: WireStyle,
    ) -> Self {
        Self { client, endpoint: endpoint.into(), wire_style }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn fetch(&self, agent_id: &str) -> Result<Credential> {
        info!("Requesting signed URL for agent: {}", agent_id);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&SignedUrlRequest { agent_id })
            .send()
            .await
            .map_err(|e| {
                SessionError::credential(None, format!("Failed to reach credential service: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            // Prefer the service's own explanation
            let detail = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("Failed to get signed URL: {}", status.as_u16()));
            return Err(SessionError::credential(Some(status.as_u16()), detail));
        }

        let body: SignedUrlResponse = response.json().await.map_err(|e| {
            SessionError::credential(Some(status.as_u16()), format!("Invalid credential response: {}", e))
        })?;
        let signed_url = body
            .signed_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| SessionError::configuration("Credential response missing signedUrl"))?;

        debug!("Received signed URL");
        Ok(Credential::new(signed_url, self.wire_style))
    }

    fn name(&self) -> &str {
        "http"
    }
}
