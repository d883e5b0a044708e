use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio_postgres::{AsyncMessage, Client, NoTls};
use tracing::{debug, error, info};

use crate::{
    error::ListenerError,
    listener::{EventStore, ListenerCloser, NOTIFICATION_BUFFER, NotificationReceiver},
    models::event::ChangeEvent,
};

pub const NOTIFICATION_CHANNEL: &str = "new_event";

const FETCH_EVENT_SQL: &str = r#"
    SELECT id, event_name, event_time::text, payload::text, webhook_id, created_at::text
    FROM events
    WHERE id = $1
"#;

pub struct PostgresEventStore {
    client: Client,
}

impl PostgresEventStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn fetch_event(&self, id: i64) -> Result<ChangeEvent, ListenerError> {
        let fetch_error = |e: tokio_postgres::Error| ListenerError::Fetch {
            id,
            message: e.to_string(),
        };

        let row = self
            .client
            .query_opt(FETCH_EVENT_SQL, &[&id])
            .await
            .map_err(fetch_error)?
            .ok_or(ListenerError::NotFound { id })?;

        Ok(ChangeEvent {
            id: row.try_get(0).map_err(fetch_error)?,
            event_name: row.try_get(1).map_err(fetch_error)?,
            event_time: row.try_get(2).map_err(fetch_error)?,
            payload: row.try_get(3).map_err(fetch_error)?,
            webhook_id: row.try_get(4).map_err(fetch_error)?,
            created_at: row.try_get(5).map_err(fetch_error)?,
        })
    }
}

/// Opens the listening connection and subscribes to `channel_name`.
///
/// Rows are fetched over a second connection. The listening driver waits
/// for room in the bounded notification buffer before reading further, so
/// a slow relay leaves the backlog queued in PostgreSQL instead of memory.
/// Closing the returned handle aborts the driver, which ends the
/// notification stream.
pub async fn connect_listener(
    database_url: &str,
    channel_name: &str,
) -> Result<(PostgresEventStore, NotificationReceiver, ListenerCloser), Error> {
    info!("Connecting to PostgreSQL database");

    let (query_client, query_connection) = tokio_postgres::connect(database_url, NoTls)
        .await
        .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

    tokio::spawn(async move {
        if let Err(e) = query_connection.await {
            error!(error = %e, "Database query connection error");
        }
    });

    let (listen_client, mut listen_connection) = tokio_postgres::connect(database_url, NoTls)
        .await
        .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

    info!("PostgreSQL connections established");

    let listen_client = Arc::new(listen_client);
    let session = Arc::clone(&listen_client);
    let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
    let listen_channel = channel_name.to_string();

    let driver = tokio::spawn(async move {
        // The session ends when its client is dropped.
        let _session = session;
        let mut messages = stream::poll_fn(move |cx| listen_connection.poll_message(cx));

        while let Some(message) = messages.next().await {
            let forwarded = match message {
                Ok(AsyncMessage::Notification(notification)) => {
                    if notification.channel() != listen_channel {
                        continue;
                    }
                    tx.send(Ok(notification.payload().to_string())).await
                }
                Ok(AsyncMessage::Notice(notice)) => {
                    debug!(notice = %notice, "Database notice");
                    continue;
                }
                Ok(_) => continue,
                Err(e) => {
                    // The connection is unusable after an error.
                    error!(error = %e, "Database connection error");
                    let _ = tx.send(Err(e.to_string())).await;
                    break;
                }
            };

            if forwarded.is_err() {
                info!("Listener stopped, closing database connection");
                return;
            }
        }

        error!("Database closed the listening connection, no further events will be relayed");
    });

    let closer = ListenerCloser::new(driver.abort_handle());

    if let Err(e) = listen_client
        .batch_execute(&format!("LISTEN {}", channel_name))
        .await
    {
        closer.close();
        return Err(anyhow!("Failed to LISTEN on {}: {}", channel_name, e));
    }

    info!(channel = channel_name, "Listening for new events");

    Ok((PostgresEventStore::new(query_client), rx, closer))
}
