mod routes;
mod models;
mod gemini;

use anyhow::Context;
use axum::{Router, routing::post};
use routes::{generate_ideas, refine_idea, update_api_key, AppState};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};
use std::sync::Arc;
use tower_http::cors::{CorsLayer, Any};

use crate::gemini::GeminiClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // A blank key is tolerated at startup; the client reports it as a
    // precondition failure on the first call.
    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
    if api_key.trim().is_empty() {
        tracing::warn!("⚠️ GEMINI_API_KEY is not set; requests will fail until a key is configured");
    }

    let state = AppState {
        gemini: Arc::new(GeminiClient::new(api_key)),
    };

    let app = Router::new()
        .route("/api/ideas", post(generate_ideas))
        .route("/api/ideas/refine", post(refine_idea))
        .route("/api/config/api-key", post(update_api_key))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state);

    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutting down");
    }
}
