use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use reqwest::{Client, header::CONTENT_TYPE};
use tracing::{debug, info, warn};

use crate::{
    clients::registry::SubscriptionRegistry,
    error::DeliveryError,
    models::{endpoint::WebhookEndpoint, event::WebhookEvent, retry::RetryPolicy},
    utils::retry_with_backoff,
};

/// Attempts and backoff spent on one endpoint of a delivered event.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointReport {
    pub endpoint_id: String,
    pub status: u16,
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    pub endpoints: Vec<EndpointReport>,
}

impl DeliveryReport {
    pub fn total_attempts(&self) -> u32 {
        self.endpoints.iter().map(|e| e.attempts).sum()
    }
}

/// Posts webhook events to every subscribed endpoint.
///
/// Endpoints of one event are tried in registry order, one at a time. The
/// first endpoint that fails terminally or runs out of retries fails the
/// whole event and the remaining endpoints are skipped.
pub struct DeliveryEngine {
    http_client: Client,
    registry: Arc<dyn SubscriptionRegistry>,
    retry_policy: RetryPolicy,
}

impl DeliveryEngine {
    pub fn new(
        registry: Arc<dyn SubscriptionRegistry>,
        retry_policy: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        info!(
            max_retries = retry_policy.max_retries,
            timeout_secs = timeout.as_secs(),
            "Delivery engine initialized"
        );

        Ok(Self {
            http_client,
            registry,
            retry_policy,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub async fn deliver(&self, event: &WebhookEvent) -> Result<DeliveryReport, DeliveryError> {
        let endpoints = self
            .registry
            .resolve_endpoints(&event.event_name)
            .await
            .map_err(|e| DeliveryError::Registry {
                event_name: event.event_name.clone(),
                message: e.to_string(),
            })?;

        let mut report = DeliveryReport::default();

        if endpoints.is_empty() {
            info!(
                event_name = %event.event_name,
                webhook_id = %event.webhook_id,
                "No endpoints subscribed, nothing to deliver"
            );
            return Ok(report);
        }

        let body = serde_json::to_vec(event)?;

        for endpoint in &endpoints {
            let outcome = retry_with_backoff(&self.retry_policy, |attempt| {
                self.send_once(endpoint, &body, attempt)
            })
            .await
            .inspect_err(|e| {
                warn!(
                    event_name = %event.event_name,
                    webhook_id = %event.webhook_id,
                    endpoint_id = %endpoint.id,
                    error = %e,
                    "Delivery failed, skipping remaining endpoints"
                );
            })?;

            info!(
                event_name = %event.event_name,
                webhook_id = %event.webhook_id,
                endpoint_id = %endpoint.id,
                attempts = outcome.attempts,
                "Webhook delivered"
            );

            report.endpoints.push(EndpointReport {
                endpoint_id: endpoint.id.clone(),
                status: outcome.value,
                attempts: outcome.attempts,
                delays: outcome.delays,
            });
        }

        Ok(report)
    }

    /// A single POST. 2xx yields the status, any other status is retryable,
    /// and a transport failure is terminal.
    pub async fn send_once(
        &self,
        endpoint: &WebhookEndpoint,
        body: &[u8],
        attempt: u32,
    ) -> Result<u16, DeliveryError> {
        let response = self
            .http_client
            .post(&endpoint.post_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                endpoint_id: endpoint.id.clone(),
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();

        debug!(
            endpoint_id = %endpoint.id,
            attempt,
            status,
            "Webhook response received"
        );

        if response.status().is_success() {
            Ok(status)
        } else {
            Err(DeliveryError::UnexpectedStatus {
                endpoint_id: endpoint.id.clone(),
                status,
            })
        }
    }
}
