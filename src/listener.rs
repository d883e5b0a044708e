//! Turns database change notifications into queued webhook events.
//!
//! Notifications are handled one at a time. A notification that cannot be
//! fetched, parsed or published is logged and dropped; nothing is retried
//! and nothing is dead-lettered at this stage.

use async_trait::async_trait;
use tokio::{sync::mpsc, task::AbortHandle};
use tracing::{info, warn};

use crate::{
    error::{ListenerError, PublishError},
    models::event::{ChangeEvent, EventPayload, WebhookEvent},
};

/// Notifications buffered ahead of the one being relayed.
pub const NOTIFICATION_BUFFER: usize = 16;

/// Notification payloads, or the text of a read error on the channel.
pub type NotificationReceiver = mpsc::Receiver<Result<String, String>>;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn fetch_event(&self, id: i64) -> Result<ChangeEvent, ListenerError>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &WebhookEvent) -> Result<(), PublishError>;
}

/// Stops a running listener from any task.
#[derive(Debug, Clone)]
pub struct ListenerCloser {
    driver: AbortHandle,
}

impl ListenerCloser {
    pub fn new(driver: AbortHandle) -> Self {
        Self { driver }
    }

    pub fn close(&self) {
        self.driver.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.driver.is_finished()
    }
}

pub fn parse_event_id(payload: &str) -> Result<i64, ListenerError> {
    payload
        .trim()
        .parse::<i64>()
        .map_err(|_| ListenerError::InvalidId {
            payload: payload.to_string(),
        })
}

pub fn build_webhook_event(event: &ChangeEvent) -> Result<WebhookEvent, ListenerError> {
    let payload: EventPayload =
        serde_json::from_str(&event.payload).map_err(|source| ListenerError::Parse {
            id: event.id,
            source,
        })?;

    Ok(WebhookEvent::from_change(event, payload))
}

/// Fetch, parse and publish the event named by one notification payload.
pub async fn relay_event(
    store: &dyn EventStore,
    sink: &dyn EventSink,
    payload: &str,
) -> Result<WebhookEvent, ListenerError> {
    let id = parse_event_id(payload)?;
    let row = store.fetch_event(id).await?;
    let event = build_webhook_event(&row)?;

    sink.publish(&event)
        .await
        .map_err(|source| ListenerError::Publish { id, source })?;

    Ok(event)
}

pub struct ChangeListener<S, P> {
    store: S,
    sink: P,
    notifications: NotificationReceiver,
    closer: ListenerCloser,
}

impl<S, P> ChangeListener<S, P>
where
    S: EventStore,
    P: EventSink,
{
    pub fn new(store: S, sink: P, notifications: NotificationReceiver, closer: ListenerCloser) -> Self {
        Self {
            store,
            sink,
            notifications,
            closer,
        }
    }

    pub fn closer(&self) -> ListenerCloser {
        self.closer.clone()
    }

    /// Runs until the notification connection is closed.
    pub async fn start(&mut self) {
        info!("Listening for new events...");

        while let Some(notification) = self.notifications.recv().await {
            let payload = match notification {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Error waiting for notification");
                    continue;
                }
            };

            match relay_event(&self.store, &self.sink, &payload).await {
                Ok(event) => info!(
                    event_id = %payload,
                    event_name = %event.event_name,
                    webhook_id = %event.webhook_id,
                    "Event pushed to queue"
                ),
                Err(e) => warn!(event_id = %payload, error = %e, "Event dropped"),
            }
        }

        info!("Notification channel closed, listener stopped");
    }

    pub fn close(&self) {
        self.closer.close();
    }
}
