use std::sync::Arc;

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    clients::health::HealthChecker, metrics::PrometheusMetrics, models::health::HealthStatus,
};

pub fn metrics_router(metrics: Arc<PrometheusMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

pub fn health_router(health_checker: Arc<HealthChecker>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(health_checker)
}

pub async fn run_api_server(listener: TcpListener, app: Router) -> Result<(), Error> {
    let app = app.layer(TraceLayer::new_for_http());

    info!(address = ?listener.local_addr().ok(), "Metrics server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn metrics_handler(State(metrics): State<Arc<PrometheusMetrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

async fn health_check(State(health_checker): State<Arc<HealthChecker>>) -> impl IntoResponse {
    let health = health_checker.check_all();

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}
