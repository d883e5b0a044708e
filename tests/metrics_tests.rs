use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use webhook_relay::{
    api::{metrics_router, run_api_server},
    metrics::{MetricsSink, NoopMetrics, PrometheusMetrics},
};

/// Test: Counters increment independently and appear in the exposition
#[test]
fn test_counters_encode() -> Result<()> {
    let metrics = PrometheusMetrics::new();

    metrics.record_received();
    metrics.record_received();
    metrics.record_processed();
    metrics.record_failed();

    assert_eq!(metrics.received(), 2);
    assert_eq!(metrics.processed(), 1);
    assert_eq!(metrics.failed(), 1);

    let text = metrics.encode()?;
    assert!(text.contains("webhook_messages_received_total 2"), "{}", text);
    assert!(text.contains("webhook_messages_processed_total 1"), "{}", text);
    assert!(text.contains("webhook_messages_failed_total 1"), "{}", text);

    Ok(())
}

/// Test: Counters tolerate concurrent increments from many workers
#[tokio::test]
async fn test_concurrent_increments() -> Result<()> {
    let metrics = PrometheusMetrics::shared();
    let mut handles = vec![];

    for _ in 0..8 {
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                metrics.record_received();
            }
        }));
    }

    for handle in handles {
        handle.await?;
    }

    assert_eq!(metrics.received(), 800);

    Ok(())
}

/// Test: The no-op sink accepts every increment
#[test]
fn test_noop_sink() {
    let sink: Arc<dyn MetricsSink> = Arc::new(NoopMetrics);

    sink.record_received();
    sink.record_processed();
    sink.record_failed();
}

/// Test: GET /metrics serves the text exposition
#[tokio::test]
async fn test_metrics_endpoint() -> Result<()> {
    let metrics = PrometheusMetrics::shared();
    metrics.record_processed();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(run_api_server(listener, metrics_router(Arc::clone(&metrics))));

    let response = reqwest::get(format!("http://{}/metrics", addr)).await?;

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await?;
    assert!(body.contains("webhook_messages_processed_total 1"), "{}", body);
    assert!(body.contains("# TYPE webhook_messages_failed counter"), "{}", body);

    server.abort();

    Ok(())
}
