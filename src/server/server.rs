use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, SharedState};

/// Configuration for the issue server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
            dev_mode: false,
        }
    }
}

impl ServerConfig {
    /// Dev mode listens on all interfaces.
    pub fn bind_addr(&self) -> String {
        let host = if self.dev_mode { "0.0.0.0" } else { self.host.as_str() };
        format!("{}:{}", host, self.port)
    }
}

/// Build the application router: issue routes, request tracing and, in dev
/// mode, permissive CORS.
pub fn build_router(state: SharedState, dev_mode: bool) -> Router {
    let mut app = api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Bind according to `config`.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener> {
    let addr = config.bind_addr();
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let local_addr: SocketAddr = listener.local_addr()?;
    info!("issuelink running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

/// Start the issue server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig, state: SharedState) -> Result<()> {
    let listener = bind(&config).await?;
    let app = build_router(state, config.dev_mode);
    serve(listener, app, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl+C handler; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
