use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use tokio::{net::TcpListener, time::sleep};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use webhook_relay::{
    api::{health_router, metrics_router, run_api_server},
    clients::{
        database::{NOTIFICATION_CHANNEL, connect_listener},
        health::HealthChecker,
        rbmq::{self, EventPublisher, QueueTopology},
        registry::{StaticRegistry, SubscriptionRegistry},
        webhook::DeliveryEngine,
    },
    config::Config,
    listener::ChangeListener,
    metrics::PrometheusMetrics,
    worker::WorkerPool,
};

const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    let connection = Arc::new(rbmq::connect(&config.rabbitmq_url).await?);
    let topology = QueueTopology::default();
    topology.declare_on(&connection).await?;

    let publisher = EventPublisher::new(&connection, &topology, config.publish_timeout()).await?;

    let (store, notifications, closer) =
        connect_listener(&config.database_url, NOTIFICATION_CHANNEL).await?;

    let registry: Arc<dyn SubscriptionRegistry> = match &config.webhook_endpoints_file {
        Some(path) => Arc::new(StaticRegistry::from_file(path)?),
        None => Arc::new(StaticRegistry::mock(&config.mock_webhook_url)),
    };

    let engine = Arc::new(DeliveryEngine::new(
        registry,
        config.retry_policy(),
        config.http_timeout(),
    )?);
    let metrics = PrometheusMetrics::shared();

    let pool = WorkerPool::new(
        Arc::clone(&connection),
        topology,
        engine,
        metrics.clone(),
        config.worker_config(),
    )
    .spawn()
    .await?;

    let mut listener = ChangeListener::new(store, publisher, notifications, closer.clone());
    let mut listener_task = tokio::spawn(async move { listener.start().await });

    let addr = format!("0.0.0.0:{}", config.server_port);
    let tcp_listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow!("Failed to bind {}: {}", addr, e))?;
    let app = metrics_router(metrics)
        .merge(health_router(Arc::new(HealthChecker::new(Arc::clone(&connection)))));
    let api_task = tokio::spawn(async move {
        if let Err(e) = run_api_server(tcp_listener, app).await {
            error!(error = %e, "Metrics server stopped");
        }
    });

    info!("Service is running");

    let listener_died = tokio::select! {
        _ = shutdown_signal() => {
            info!(
                grace_secs = config.shutdown_grace_secs,
                "Shutdown signal received, waiting before closing connections"
            );
            sleep(config.shutdown_grace()).await;
            false
        }
        _ = &mut listener_task => {
            error!("Event listener stopped unexpectedly, shutting down");
            true
        }
    };

    closer.close();
    if !listener_died {
        let _ = listener_task.await;
    }

    pool.shutdown(WORKER_STOP_TIMEOUT).await;
    api_task.abort();

    if let Err(e) = connection.close(200, "shutdown".into()).await {
        error!(error = %e, "Failed to close RabbitMQ connection");
    }

    info!("Everything closed");

    if listener_died {
        return Err(anyhow!("Event listener stopped before shutdown was requested"));
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for interrupt");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
