use crate::config::Config;
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub mod routes_api;
pub mod routes_download;
pub mod routes_sse;
pub mod routes_upload;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<AppState>,
    pub config: Arc<Config>,
}

impl AppContext {
    pub fn new(state: Arc<AppState>, config: Arc<Config>) -> Self {
        Self { state, config }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    let mut app = Router::new()
        .route("/health", get(health_check))
        .merge(routes_upload::upload_routes(&ctx.config))
        .merge(routes_download::download_routes())
        .nest("/api", api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // Anything unmatched falls through to the static directory, if any
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            app = app.fallback_service(ServeDir::new(&dir).append_index_html_on_directories(true));
        } else {
            tracing::warn!("Static directory does not exist: {:?}", dir);
        }
    }

    app
}

fn api_routes() -> Router<AppContext> {
    routes_api::api_routes().merge(routes_sse::sse_routes())
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(config: Arc<Config>, state: Arc<AppState>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let static_dir = config.server.static_dir.clone();
    let app = create_router(AppContext::new(state, config), static_dir);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
