use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::event::WebhookEvent;

/// Queue message wrapping a webhook event with its publish time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub content: WebhookEvent,
    pub timestamp: String,
}

impl Envelope {
    pub fn new(content: WebhookEvent) -> Self {
        Self {
            content,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}
