use std::{collections::HashMap, sync::Arc, time::Duration};

use webhook_relay::{
    clients::{registry::StaticRegistry, webhook::DeliveryEngine},
    models::{
        endpoint::WebhookEndpoint,
        event::{Segment, Subscriber, WebhookEvent},
        retry::RetryPolicy,
    },
};

pub const HOOK_PATH: &str = "/customer-webhook";

pub fn sample_subscriber() -> Subscriber {
    Subscriber {
        id: "sub_1".to_string(),
        status: "active".to_string(),
        email: "ada@example.com".to_string(),
        source: "api".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        segments: vec![Segment {
            id: "seg_1".to_string(),
            name: "Early adopters".to_string(),
        }],
        custom_fields: HashMap::from([
            ("company".to_string(), "Analytical Engines".to_string()),
            ("plan".to_string(), "pro".to_string()),
        ]),
        optin_ip: "203.0.113.7".to_string(),
        optin_timestamp: "2024-01-02T03:04:05Z".to_string(),
        created_at: "2024-01-02T03:04:05Z".to_string(),
    }
}

pub fn sample_event(event_name: &str, webhook_id: &str) -> WebhookEvent {
    WebhookEvent {
        event_name: event_name.to_string(),
        event_time: "2024-01-02 03:04:05+00".to_string(),
        subscriber: sample_subscriber(),
        segment: None,
        webhook_id: webhook_id.to_string(),
    }
}

/// Same schedule shape as the default policy, in milliseconds.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 5,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(30),
    }
}

pub fn engine_with(endpoints: Vec<WebhookEndpoint>, policy: RetryPolicy) -> DeliveryEngine {
    DeliveryEngine::new(
        Arc::new(StaticRegistry::new(endpoints)),
        policy,
        Duration::from_secs(5),
    )
    .expect("engine should build")
}

/// An address nothing listens on.
pub fn unreachable_url() -> String {
    "http://127.0.0.1:1/customer-webhook".to_string()
}
