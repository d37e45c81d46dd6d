//! Credential broker service
//!
//! The trusted backend that holds the ElevenLabs API key and hands visitors
//! signed conversation URLs:
//! - POST /api/elevenlabs/signed-url - Exchange `{ "agentId" }` for `{ "signedUrl" }`
//! - GET /health - Health check

use anyhow::{Context, Result};
use tracing::info;

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, SignedUrlRequest, SignedUrlResponse};
pub use routes::create_router;
pub use state::AppState;

/// Bind and serve the broker until the listener fails.
pub async fn serve(bind: &str, port: u16, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Credential broker listening on http://{}", addr);

    axum::serve(listener, create_router(state))
        .await
        .context("HTTP server failed")?;

    Ok(())
}
