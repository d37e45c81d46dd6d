use anyhow::{Context, Result};
use async_nats::Client;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{event_subject, SessionEventMessage};
use crate::session::SessionEvent;

/// Publishes session events for dashboards and operators
pub struct EventPublisher {
    client: Client,
    subject_prefix: String,
}

impl EventPublisher {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject_prefix: impl Into<String>) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, subject_prefix: subject_prefix.into() })
    }

    /// Publish one event on `<prefix>.<session>.<kind>`
    pub async fn publish(&self, session_id: &str, event: SessionEvent) -> Result<()> {
        let subject = event_subject(&self.subject_prefix, session_id, event.kind());
        let payload = serde_json::to_vec(&SessionEventMessage::new(session_id, event))?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish session event")?;

        debug!("Published session event to {}", subject);

        Ok(())
    }

    /// Forward a session's events until its event channel closes.
    ///
    /// Audio-level samples are visualization-only and stay local.
    pub fn spawn_forwarder(
        self: Arc<Self>,
        session_id: String,
        mut events: broadcast::Receiver<SessionEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Forwarding events for session {} to NATS", session_id);
            loop {
                match events.recv().await {
                    Ok(SessionEvent::AudioLevel { .. }) => {}
                    Ok(event) => {
                        if let Err(e) = self.publish(&session_id, event).await {
                            warn!("Failed to publish session event: {:#}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("NATS forwarder lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            info!("Event forwarding stopped for session {}", session_id);
        })
    }

    /// Flush pending publications
    pub async fn flush(&self) -> Result<()> {
        self.client.flush().await.context("Failed to flush NATS")?;
        Ok(())
    }
}
