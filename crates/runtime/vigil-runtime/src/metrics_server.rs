use axum::{http::StatusCode, routing::get, Router};
use prometheus::{gather, Encoder, TextEncoder};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// Text exposition of every registered validator metric.
fn render_metrics() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render_metrics().map_err(|e| {
        tracing::error!(error = %e, "Failed to render validator metrics");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("# vigil metrics unavailable: {}\n", e),
        )
    })
}

/// Serves Prometheus metrics on `addr` until `shutdown` is cancelled.
pub async fn run_metrics_server(addr: SocketAddr, shutdown: CancellationToken) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind metrics server to {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("Metrics server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        tracing::error!("Metrics server failed: {}", e);
    }
}
