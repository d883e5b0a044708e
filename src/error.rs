//! Classified failures of the event pipeline.
//!
//! Each enum belongs to one stage. None of them escape the stage boundary:
//! the listener logs and drops, the worker acks or dead-letters.

use thiserror::Error;

/// Reasons a change notification never reaches the queue.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("notification payload '{payload}' is not an event id")]
    InvalidId { payload: String },

    #[error("event {id} not found")]
    NotFound { id: i64 },

    #[error("failed to fetch event {id}: {message}")]
    Fetch { id: i64, message: String },

    #[error("failed to parse payload of event {id}: {source}")]
    Parse {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to publish event {id}: {source}")]
    Publish {
        id: i64,
        #[source]
        source: PublishError,
    },
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("broker rejected publish: {0}")]
    Broker(String),

    #[error("publish timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Delivery outcome classification for one event.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to resolve endpoints for '{event_name}': {message}")]
    Registry { event_name: String, message: String },

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Connection refused, DNS failure, timeout. Never retried.
    #[error("transport error delivering to {endpoint_id}: {message}")]
    Transport { endpoint_id: String, message: String },

    /// Non-2xx response from the endpoint. Retried with backoff.
    #[error("endpoint {endpoint_id} responded with HTTP {status}")]
    UnexpectedStatus { endpoint_id: String, status: u16 },

    #[error("delivery to {endpoint_id} failed after {attempts} attempts (last status {last_status})")]
    RetriesExhausted {
        endpoint_id: String,
        attempts: u32,
        last_status: u16,
    },
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::UnexpectedStatus { .. })
    }

    pub fn endpoint_id(&self) -> Option<&str> {
        match self {
            DeliveryError::Transport { endpoint_id, .. }
            | DeliveryError::UnexpectedStatus { endpoint_id, .. }
            | DeliveryError::RetriesExhausted { endpoint_id, .. } => Some(endpoint_id),
            _ => None,
        }
    }
}
