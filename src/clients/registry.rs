use std::path::Path;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::models::endpoint::WebhookEndpoint;

/// Lookup of the endpoints subscribed to an event name.
///
/// Implementations are shared by every worker and must tolerate concurrent
/// reads.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    async fn resolve_endpoints(&self, event_name: &str) -> Result<Vec<WebhookEndpoint>, Error>;
}

/// Fixed endpoint table held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    endpoints: Vec<WebhookEndpoint>,
}

impl StaticRegistry {
    pub fn new(endpoints: Vec<WebhookEndpoint>) -> Self {
        Self { endpoints }
    }

    /// The built-in table used when no endpoint file is configured.
    pub fn mock(post_url: &str) -> Self {
        Self::new(vec![
            WebhookEndpoint::new("WH01", post_url, &["subscriber.added_to_segment"]),
            WebhookEndpoint::new("WH02", post_url, &["subscriber.created"]),
            WebhookEndpoint::new("WH03", post_url, &["subscriber.unsubscribed"]),
        ])
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read endpoints file {}: {}", path.display(), e))?;
        let endpoints: Vec<WebhookEndpoint> = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("Invalid endpoints file {}: {}", path.display(), e))?;

        info!(
            path = %path.display(),
            endpoint_count = endpoints.len(),
            "Loaded webhook endpoints"
        );

        Ok(Self::new(endpoints))
    }

    pub fn endpoints(&self) -> &[WebhookEndpoint] {
        &self.endpoints
    }
}

#[async_trait]
impl SubscriptionRegistry for StaticRegistry {
    async fn resolve_endpoints(&self, event_name: &str) -> Result<Vec<WebhookEndpoint>, Error> {
        let matched: Vec<WebhookEndpoint> = self
            .endpoints
            .iter()
            .filter(|endpoint| endpoint.subscribes_to(event_name))
            .cloned()
            .collect();

        debug!(event_name, matched = matched.len(), "Resolved webhook endpoints");

        Ok(matched)
    }
}
