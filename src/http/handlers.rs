use super::state::AppState;
use crate::credentials::elevenlabs::{signed_url_request, UpstreamSignedUrl};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlRequest {
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlResponse {
    pub success: bool,
    pub signed_url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn error_response(status: StatusCode, error: impl Into<String>, details: Option<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into(), details })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/elevenlabs/signed-url
/// Exchange an agent id for a signed, single-use conversation URL
pub async fn signed_url(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(api_key) = state.api_key.as_deref() else {
        error!("Signed URL requested but no ElevenLabs API key is configured");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ElevenLabs API key not configured",
            None,
        );
    };

    let request: SignedUrlRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("Error getting signed URL: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), None);
        }
    };

    let Some(agent_id) = request.agent_id.filter(|id| !id.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "agentId is required", None);
    };

    info!("Issuing signed URL for agent: {}", agent_id);

    let response =
        match signed_url_request(&state.client, &state.upstream_base_url, api_key, &agent_id)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Error getting signed URL: {}", e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), None);
            }
        };

    let status = response.status();
    if !status.is_success() {
        let details = response.text().await.unwrap_or_default();
        error!("ElevenLabs signed URL error ({}): {}", status, details);
        let status =
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return error_response(status, "Failed to get signed URL", Some(details));
    }

    match response.json::<UpstreamSignedUrl>().await {
        Ok(data) => (
            StatusCode::OK,
            Json(SignedUrlResponse { success: true, signed_url: data.signed_url }),
        )
            .into_response(),
        Err(e) => {
            error!("Invalid ElevenLabs response: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), None)
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
