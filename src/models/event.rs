use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// One row of the `events` table as read by the listener.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub id: i64,
    pub event_name: String,
    pub event_time: String,
    pub payload: String,
    pub webhook_id: String,
    pub created_at: Option<String>,
}

/// Shape of the JSON stored in `events.payload`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub subscriber: Subscriber,

    #[serde(default)]
    pub segment: Option<Segment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_name: String,
    pub event_time: String,

    #[serde(deserialize_with = "null_as_default")]
    pub subscriber: Subscriber,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<Segment>,

    pub webhook_id: String,
}

impl WebhookEvent {
    pub fn from_change(event: &ChangeEvent, payload: EventPayload) -> Self {
        Self {
            event_name: event.event_name.clone(),
            event_time: event.event_time.clone(),
            subscriber: payload.subscriber,
            segment: payload.segment,
            webhook_id: event.webhook_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscriber {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub last_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub segments: Vec<Segment>,
    #[serde(deserialize_with = "null_as_default")]
    pub custom_fields: HashMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub optin_ip: String,
    #[serde(deserialize_with = "null_as_default")]
    pub optin_timestamp: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Segment {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

/// Explicit `null` decodes the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
