//! Message counters for the consumer side.
//!
//! Workers only ever increment. The Prometheus implementation owns its own
//! registry so the HTTP surface can encode it without global state.

use std::sync::Arc;

use prometheus_client::{metrics::counter::Counter, registry::Registry};

pub trait MetricsSink: Send + Sync {
    fn record_received(&self);
    fn record_processed(&self);
    fn record_failed(&self);
}

pub struct PrometheusMetrics {
    registry: Registry,
    received: Counter,
    processed: Counter,
    failed: Counter,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let received = Counter::default();
        let processed = Counter::default();
        let failed = Counter::default();

        registry.register(
            "webhook_messages_received",
            "Total number of messages received from RabbitMQ queue",
            received.clone(),
        );
        registry.register(
            "webhook_messages_processed",
            "Total number of messages processed successfully",
            processed.clone(),
        );
        registry.register(
            "webhook_messages_failed",
            "Total number of messages that failed processing",
            failed.clone(),
        );

        Self {
            registry,
            received,
            processed,
            failed,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Text exposition of all three counters.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)?;
        Ok(buf)
    }

    pub fn received(&self) -> u64 {
        self.received.get()
    }

    pub fn processed(&self) -> u64 {
        self.processed.get()
    }

    pub fn failed(&self) -> u64 {
        self.failed.get()
    }
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record_received(&self) {
        self.received.inc();
    }

    fn record_processed(&self) {
        self.processed.inc();
    }

    fn record_failed(&self) {
        self.failed.inc();
    }
}

pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_received(&self) {}
    fn record_processed(&self) {}
    fn record_failed(&self) {}
}
