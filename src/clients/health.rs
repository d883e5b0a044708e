use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use lapin::Connection;
use tracing::{debug, warn};

use crate::models::health::{HealthCheckResponse, ServiceHealth};

pub struct HealthChecker {
    connection: Arc<Connection>,
}

impl HealthChecker {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    pub fn check_all(&self) -> HealthCheckResponse {
        let message_broker = self.check_rabbitmq();

        HealthCheckResponse {
            status: message_broker.status.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            message_broker,
        }
    }

    fn check_rabbitmq(&self) -> ServiceHealth {
        if self.connection.status().connected() {
            debug!("RabbitMQ health check passed");
            ServiceHealth::healthy()
        } else {
            warn!("RabbitMQ connection is not open");
            ServiceHealth::unhealthy("Connection is not open".to_string())
        }
    }
}
