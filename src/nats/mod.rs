//! Optional publication of session events to NATS

pub mod client;
pub mod messages;

pub use client::EventPublisher;
pub use messages::{event_subject, SessionEventMessage};
