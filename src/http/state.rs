use crate::credentials::ELEVENLABS_BASE_URL;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Client for the upstream credential service
    pub client: reqwest::Client,

    /// ElevenLabs API base URL
    pub upstream_base_url: String,

    /// ElevenLabs API key; requests fail with 500 when absent
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_upstream(ELEVENLABS_BASE_URL, api_key)
    }

    pub fn with_upstream(upstream_base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            upstream_base_url: upstream_base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("upstream_base_url", &self.upstream_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<set>"))
            .finish()
    }
}
