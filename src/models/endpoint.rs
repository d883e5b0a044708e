use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: String,
    pub post_url: String,
    pub events: Vec<String>,
}

impl WebhookEndpoint {
    pub fn new(id: impl Into<String>, post_url: impl Into<String>, events: &[&str]) -> Self {
        Self {
            id: id.into(),
            post_url: post_url.into(),
            events: events.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn subscribes_to(&self, event_name: &str) -> bool {
        self.events.iter().any(|e| e == event_name)
    }
}
