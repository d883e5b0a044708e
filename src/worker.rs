//! Consumer workers for the main webhook queue.
//!
//! Every worker owns one channel with its own prefetch limit and handles one
//! message at a time: a worker stuck in backoff holds at most
//! `prefetch_count` unacknowledged messages while the others keep going.

use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use futures_util::StreamExt;
use lapin::{
    Channel, Connection, Consumer,
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
};
use tokio::{sync::watch, task::JoinHandle, time::timeout};
use tracing::{debug, error, info, warn};

use crate::{
    clients::{rbmq::QueueTopology, webhook::DeliveryEngine},
    config::WorkerConfig,
    metrics::MetricsSink,
    models::{
        message::Envelope,
        status::{Disposition, ShutdownPolicy},
    },
};

/// Decides the fate of one queue message.
///
/// Unparseable bodies and failed deliveries are dead-lettered, everything
/// else is acknowledged.
pub async fn process_message(
    body: &[u8],
    engine: &DeliveryEngine,
    metrics: &dyn MetricsSink,
) -> Disposition {
    metrics.record_received();

    let envelope = match serde_json::from_slice::<Envelope>(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Cannot parse message body, dead-lettering");
            metrics.record_failed();
            return Disposition::DeadLetter;
        }
    };

    let event = &envelope.content;

    debug!(
        event_name = %event.event_name,
        webhook_id = %event.webhook_id,
        published_at = %envelope.timestamp,
        "Processing webhook event"
    );

    match engine.deliver(event).await {
        Ok(report) => {
            metrics.record_processed();
            info!(
                event_name = %event.event_name,
                webhook_id = %event.webhook_id,
                endpoints = report.endpoints.len(),
                attempts = report.total_attempts(),
                "Webhook event processed"
            );
            Disposition::Ack
        }
        Err(e) => {
            metrics.record_failed();
            warn!(
                event_name = %event.event_name,
                webhook_id = %event.webhook_id,
                error = %e,
                "Webhook event failed, dead-lettering"
            );
            Disposition::DeadLetter
        }
    }
}

pub async fn settle(delivery: &Delivery, disposition: Disposition) -> Result<(), Error> {
    let result = match disposition {
        Disposition::Ack => delivery.acker.ack(BasicAckOptions::default()).await,
        Disposition::DeadLetter => {
            delivery
                .acker
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue: false,
                })
                .await
        }
        Disposition::Requeue => {
            delivery
                .acker
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue: true,
                })
                .await
        }
    };

    result
        .map(|_| ())
        .map_err(|e| anyhow!("Failed to settle message ({}): {}", disposition, e))
}

pub struct WorkerPool {
    connection: Arc<Connection>,
    topology: QueueTopology,
    engine: Arc<DeliveryEngine>,
    metrics: Arc<dyn MetricsSink>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(
        connection: Arc<Connection>,
        topology: QueueTopology,
        engine: Arc<DeliveryEngine>,
        metrics: Arc<dyn MetricsSink>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            connection,
            topology,
            engine,
            metrics,
            config,
        }
    }

    /// Opens every worker's channel and subscription, then starts them.
    /// Failing to open any of them is a startup error.
    pub async fn spawn(self) -> Result<WorkerPoolHandle, Error> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers = Vec::with_capacity(self.config.worker_count);

        for id in 1..=self.config.worker_count {
            let (channel, consumer) = self.subscribe(id).await?;

            workers.push(Worker {
                id,
                channel,
                consumer,
                engine: Arc::clone(&self.engine),
                metrics: Arc::clone(&self.metrics),
                shutdown_policy: self.config.shutdown_policy,
                shutdown: shutdown_rx.clone(),
            });
        }

        let handles = workers
            .into_iter()
            .map(|worker| tokio::spawn(worker.run()))
            .collect();

        info!(
            workers = self.config.worker_count,
            prefetch = self.config.prefetch_count,
            queue = %self.topology.queue,
            "Worker pool started"
        );

        Ok(WorkerPoolHandle {
            handles,
            shutdown: shutdown_tx,
        })
    }

    async fn subscribe(&self, id: usize) -> Result<(Channel, Consumer), Error> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("Worker {}: Failed to open channel: {}", id, e))?;

        channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Worker {}: Failed to set prefetch: {}", id, e))?;

        let consumer = channel
            .basic_consume(
                self.topology.queue.as_str(),
                format!("webhook_worker_{}", id).as_str(),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Worker {}: Failed to start consumer: {}", id, e))?;

        Ok((channel, consumer))
    }
}

#[must_use = "dropping the handle leaves workers running without a way to stop them"]
pub struct WorkerPoolHandle {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPoolHandle {
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Tells every worker to settle its in-flight message per the shutdown
    /// policy and close its channel, then waits up to `wait` for them.
    pub async fn shutdown(self, wait: Duration) {
        let _ = self.shutdown.send(true);

        for handle in self.handles {
            match timeout(wait, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Worker task panicked"),
                Err(_) => warn!("Worker did not stop in time"),
            }
        }
    }
}

struct Worker {
    id: usize,
    channel: Channel,
    consumer: Consumer,
    engine: Arc<DeliveryEngine>,
    metrics: Arc<dyn MetricsSink>,
    shutdown_policy: ShutdownPolicy,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        info!(worker_id = self.id, "Worker started");

        let mut closing = false;

        while !closing {
            let next = tokio::select! {
                next = self.consumer.next() => next,
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    closing = true;
                    continue;
                }
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    warn!(worker_id = self.id, error = %e, "Consumer error");
                    break;
                }
                None => break,
            };

            debug!(
                worker_id = self.id,
                delivery_tag = delivery.delivery_tag,
                "Received a message"
            );

            let disposition = tokio::select! {
                disposition = process_message(&delivery.data, &self.engine, self.metrics.as_ref()) => disposition,
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    closing = true;
                    warn!(
                        worker_id = self.id,
                        policy = ?self.shutdown_policy,
                        "Forced shutdown during delivery"
                    );
                    self.shutdown_policy.disposition()
                }
            };

            if let Err(e) = settle(&delivery, disposition).await {
                error!(worker_id = self.id, error = %e, "Failed to settle message");
            }
        }

        if closing {
            if let Err(e) = self.channel.close(200, "worker shutdown".into()).await {
                debug!(worker_id = self.id, error = %e, "Channel already closed");
            }
        }

        info!(worker_id = self.id, "Channel closed, worker shutting down");
    }
}

/// Resolves once a forced shutdown is requested.
///
/// A dropped pool handle is not a shutdown request: the worker keeps
/// consuming until its subscription closes.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|forced| *forced).await.is_err() {
        std::future::pending::<()>().await;
    }
}
