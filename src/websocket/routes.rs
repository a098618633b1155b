use crate::config::Config;
use crate::metrics::MetricsSnapshot;
use crate::server::{HealthReport, RelayServer, ServerConfig};
use anyhow::Context;
use axum::extract::State;
use axum::routing::get;
use axum::Json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::handler::websocket_handler;

/// Create the Axum router. Clients may upgrade on `/` or `/ws`.
pub fn create_router() -> axum::Router<Arc<RelayServer>> {
    use tower_http::trace::TraceLayer;

    axum::Router::new()
        .route("/", get(websocket_handler))
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint
pub async fn health_handler(State(server): State<Arc<RelayServer>>) -> Json<HealthReport> {
    Json(server.health_check().await)
}

/// JSON counters snapshot
pub async fn metrics_handler(State(server): State<Arc<RelayServer>>) -> Json<MetricsSnapshot> {
    Json(server.metrics().snapshot())
}

/// Serve the relay on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    server: Arc<RelayServer>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router().with_state(server);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

/// Bind `host:port` and run the relay until ctrl-c.
///
/// With TLS enabled the certificate material must load; there is no plaintext
/// fallback.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let server = RelayServer::new(ServerConfig::from_config(&config));
    let maintenance = server.start_maintenance();

    let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to resolve listen address {}:{}", config.host, config.port))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("no address found for {}:{}", config.host, config.port))?;

    #[cfg(feature = "tls")]
    if config.security.transport.tls.enabled {
        let tls_config = crate::security::build_rustls_config(&config.security.transport.tls)
            .map_err(|err| anyhow::anyhow!("failed to initialize TLS configuration: {err}"))?;

        tracing::info!(%addr, "Relay listening over TLS (wss://)");

        let app = create_router().with_state(server);
        let result = axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await;
        maintenance.abort();
        result?;
        return Ok(());
    }

    #[cfg(not(feature = "tls"))]
    if config.security.transport.tls.enabled {
        anyhow::bail!("TLS is enabled but this binary was built without the `tls` feature");
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Relay listening over plain WebSocket (ws://)");

    let result = serve(listener, server, shutdown_signal()).await;
    maintenance.abort();
    tracing::info!("Relay stopped");
    result
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
