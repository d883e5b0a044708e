use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{retry::RetryPolicy, status::ShutdownPolicy};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub database_url: String,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    pub webhook_endpoints_file: Option<String>,
    #[serde(default = "default_mock_webhook_url")]
    pub mock_webhook_url: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub shutdown_unacked_policy: ShutdownPolicy,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;

        if config.worker_count == 0 {
            return Err(anyhow!("WORKER_COUNT must be at least 1"));
        }

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_retry_delay_ms),
            max_delay: Duration::from_millis(self.max_retry_delay_ms),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            worker_count: self.worker_count,
            prefetch_count: self.prefetch_count,
            shutdown_policy: self.shutdown_unacked_policy,
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub prefetch_count: u16,
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            prefetch_count: default_prefetch_count(),
            shutdown_policy: ShutdownPolicy::default(),
        }
    }
}

fn default_worker_count() -> usize {
    3
}

fn default_prefetch_count() -> u16 {
    2
}

fn default_publish_timeout_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_retry_delay_ms() -> u64 {
    1_000
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_mock_webhook_url() -> String {
    "http://localhost:3000/customer-webhook".to_string()
}

fn default_server_port() -> u16 {
    2112
}

fn default_shutdown_grace_secs() -> u64 {
    3
}
