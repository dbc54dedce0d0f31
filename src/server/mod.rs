//! HTTP server for the shop assistant.
//!
//! Provides:
//! - The chat page (static assets)
//! - Chat relay and settings endpoints
//! - Session-bound anti-forgery tokens

pub mod nonce;
pub mod routes;
pub mod session;
pub mod state;

pub use routes::create_router;
pub use session::BoundedSessionStore;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Start the HTTP server with graceful shutdown support.
///
/// The server will stop accepting new connections when `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the server fails to bind or serve.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    port: u16,
    static_dir: &Path,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors = cors_layer(&state.server.allowed_origins);

    let mut app: Router = create_router(state, static_dir);
    if let Some(cors) = cors {
        app = app.layer(cors);
    }
    let app = app.layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Shop assistant listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// CORS for the configured extra origins; `None` keeps the API same-origin.
fn cors_layer(allowed_origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}
