use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use webhook_relay::{
    listener::build_webhook_event,
    models::{
        event::{ChangeEvent, EventPayload, Segment, Subscriber, WebhookEvent},
        message::Envelope,
    },
};

use crate::common::sample_event;

/// Test: Events round-trip through JSON with and without a segment
#[test]
fn test_webhook_event_round_trip() -> Result<()> {
    let without = sample_event("subscriber.created", "WH02");
    let mut with = sample_event("subscriber.added_to_segment", "WH01");
    with.segment = Some(Segment {
        id: "seg_3".to_string(),
        name: "Newsletter".to_string(),
    });

    for event in [without, with] {
        let encoded = serde_json::to_string(&event)?;
        let decoded: WebhookEvent = serde_json::from_str(&encoded)?;
        assert_eq!(decoded, event);
    }

    Ok(())
}

/// Test: Field names on the wire match what endpoints receive
#[test]
fn test_webhook_event_wire_format() -> Result<()> {
    let event = sample_event("subscriber.created", "WH02");
    let value = serde_json::to_value(&event)?;

    assert_eq!(value["event_name"], "subscriber.created");
    assert_eq!(value["webhook_id"], "WH02");
    assert!(value.get("segment").is_none(), "absent segment is omitted");
    assert_eq!(value["subscriber"]["custom_fields"]["plan"], "pro");
    assert_eq!(value["subscriber"]["segments"][0]["name"], "Early adopters");
    assert_eq!(value["subscriber"]["optin_ip"], "203.0.113.7");

    Ok(())
}

/// Test: The envelope wraps content with a UTC RFC3339 timestamp
#[test]
fn test_envelope_wire_format() -> Result<()> {
    let event = sample_event("subscriber.created", "WH02");
    let envelope = Envelope::new(event.clone());

    let value: Value = serde_json::to_value(&envelope)?;
    let object = value.as_object().expect("envelope is an object");
    assert_eq!(object.len(), 2);
    assert_eq!(serde_json::from_value::<WebhookEvent>(value["content"].clone())?, event);

    let timestamp = value["timestamp"].as_str().expect("timestamp is a string");
    assert!(timestamp.ends_with('Z'), "timestamp {} should be UTC", timestamp);
    let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(timestamp)?.with_timezone(&Utc);
    assert!((Utc::now() - parsed).num_seconds().abs() < 60);

    Ok(())
}

/// Test: The envelope keeps its own copy of the event
#[test]
fn test_envelope_snapshot_is_independent() {
    let mut event = sample_event("subscriber.created", "WH02");
    let envelope = Envelope::new(event.clone());

    event.subscriber.email = "changed@example.com".to_string();
    event.segment = Some(Segment::default());

    assert_eq!(envelope.content.subscriber.email, "ada@example.com");
    assert!(envelope.content.segment.is_none());
}

/// Test: Sparse subscriber payloads fill missing fields with defaults
#[test]
fn test_sparse_subscriber_defaults() -> Result<()> {
    let subscriber: Subscriber = serde_json::from_value(json!({"id": "sub_1", "email": "a@b.c"}))?;

    assert_eq!(subscriber.id, "sub_1");
    assert!(subscriber.segments.is_empty());
    assert!(subscriber.custom_fields.is_empty());
    assert_eq!(subscriber.status, "");

    Ok(())
}

/// Test: Explicit nulls decode as empty values instead of failing
#[test]
fn test_null_fields_decode_as_defaults() -> Result<()> {
    let payload: EventPayload = serde_json::from_value(json!({
        "subscriber": {
            "id": "sub_9",
            "email": "null@example.com",
            "first_name": null,
            "segments": null,
            "custom_fields": null
        },
        "segment": {"id": "seg_2", "name": null}
    }))?;

    assert_eq!(payload.subscriber.id, "sub_9");
    assert_eq!(payload.subscriber.first_name, "");
    assert!(payload.subscriber.segments.is_empty());
    assert!(payload.subscriber.custom_fields.is_empty());
    assert_eq!(payload.segment.map(|s| s.name), Some(String::new()));

    Ok(())
}

/// Test: An envelope with null collections is still a valid message
#[test]
fn test_envelope_with_null_collections() -> Result<()> {
    let body = json!({
        "content": {
            "event_name": "subscriber.created",
            "event_time": "2024-05-06 07:08:09+00",
            "subscriber": {"id": "sub_1", "segments": null, "custom_fields": null, "status": null},
            "segment": null,
            "webhook_id": "WH02"
        },
        "timestamp": "2024-05-06T07:08:09Z"
    });

    let envelope: Envelope = serde_json::from_value(body)?;

    assert_eq!(envelope.content.subscriber.id, "sub_1");
    assert_eq!(envelope.content.subscriber.status, "");
    assert!(envelope.content.subscriber.segments.is_empty());
    assert!(envelope.content.segment.is_none());

    Ok(())
}

/// Test: Row metadata and parsed payload combine into one event
#[test]
fn test_build_event_from_row() -> Result<()> {
    let row = ChangeEvent {
        id: 42,
        event_name: "subscriber.created".to_string(),
        event_time: "2024-05-06 07:08:09+00".to_string(),
        payload: json!({
            "subscriber": {"id": "sub_42", "email": "x@example.com"},
            "segment": {"id": "seg_1", "name": "Trial"}
        })
        .to_string(),
        webhook_id: "WH02".to_string(),
        created_at: None,
    };

    let event = build_webhook_event(&row)?;

    assert_eq!(event.event_name, row.event_name);
    assert_eq!(event.event_time, row.event_time);
    assert_eq!(event.webhook_id, "WH02");
    assert_eq!(event.subscriber.id, "sub_42");
    assert_eq!(event.segment.map(|s| s.name), Some("Trial".to_string()));

    Ok(())
}
