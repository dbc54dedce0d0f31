//! HTTP route handlers for the shop assistant API.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tower_sessions::Session;
use url::Url;

use crate::assistant::core::errors::AssistantError;

use super::nonce;
use super::session::session_layer;
use super::state::AppState;

/// Create the API router with all routes; unmatched paths serve `static_dir`.
///
/// The `/api` routes only accept requests from the page's own origin or a
/// configured one, and every route runs inside a cookie session.
pub fn create_router(state: Arc<AppState>, static_dir: &Path) -> Router {
    let sessions = session_layer(
        state.sessions.clone(),
        &state.nonce,
        state.server.secure_cookies,
    );

    let api = Router::new()
        .route("/api/nonce", get(issue_nonce))
        .route("/api/chat", post(send_message))
        .route("/api/settings", get(settings_status).post(update_settings))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            reject_foreign_origin,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .fallback_service(ServeDir::new(static_dir))
        .layer(sessions)
        .with_state(state)
}

/// Whether a request carrying `origin` may reach the API when it was sent
/// to `host`. Requests without an `Origin` header pass; the session token
/// still guards them.
fn origin_allowed(origin: Option<&str>, host: Option<&str>, allowed: &[String]) -> bool {
    let Some(origin) = origin else {
        return true;
    };
    if allowed.iter().any(|entry| entry == origin) {
        return true;
    }

    let Ok(parsed) = Url::parse(origin) else {
        return false;
    };
    let Some(origin_host) = parsed.host_str() else {
        return false;
    };
    let authority = parsed.port().map_or_else(
        || origin_host.to_string(),
        |port| format!("{origin_host}:{port}"),
    );
    host.is_some_and(|value| value.eq_ignore_ascii_case(&authority))
}

/// Reject API calls whose `Origin` is neither this host nor allow-listed.
async fn reject_foreign_origin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or_else(|| request.uri().authority().map(ToString::to_string));

    if origin_allowed(
        origin.as_deref(),
        host.as_deref(),
        &state.server.allowed_origins,
    ) {
        return next.run(request).await;
    }

    tracing::warn!(
        origin = origin.as_deref().unwrap_or_default(),
        "rejected cross-origin API request"
    );
    forbidden("cross-origin request rejected").into_response()
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "shop-chat-assistant",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Anti-forgery token response.
#[derive(Debug, Serialize, Deserialize)]
pub struct NonceResponse {
    /// Token to echo back on mutating requests.
    pub nonce: String,
}

/// Issue the session's anti-forgery token, starting a session if needed.
async fn issue_nonce(
    session: Session,
) -> Result<Json<NonceResponse>, (StatusCode, Json<ChatEnvelope>)> {
    match nonce::issue(&session).await {
        Ok(token) => Ok(Json(NonceResponse { nonce: token })),
        Err(err) => {
            tracing::error!(error = %err, "failed to issue nonce");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatEnvelope::fail("session unavailable")),
            ))
        }
    }
}

/// Chat message request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Operator text.
    #[serde(default)]
    pub message: String,
    /// Anti-forgery token.
    #[serde(default)]
    pub nonce: String,
}

/// Uniform success/failure envelope returned to the chat page.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatEnvelope {
    /// Whether the round trip succeeded.
    pub success: bool,
    /// Assistant reply on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatEnvelope {
    fn ok(response: impl Into<String>) -> Self {
        Self {
            success: true,
            response: Some(response.into()),
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
        }
    }
}

fn forbidden(reason: &str) -> (StatusCode, Json<ChatEnvelope>) {
    (StatusCode::FORBIDDEN, Json(ChatEnvelope::fail(reason)))
}

const BAD_NONCE: &str = "invalid or expired nonce";

/// Relay one operator message.
async fn send_message(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(request): Json<ChatRequest>,
) -> (StatusCode, Json<ChatEnvelope>) {
    if !nonce::verify(&session, &request.nonce).await {
        tracing::warn!("rejected chat message with invalid nonce");
        return forbidden(BAD_NONCE);
    }

    match state.relay.send(&request.message).await {
        Ok(reply) => (StatusCode::OK, Json(ChatEnvelope::ok(reply))),
        Err(AssistantError::EmptyMessage) => (
            StatusCode::BAD_REQUEST,
            Json(ChatEnvelope::fail(AssistantError::EmptyMessage.to_string())),
        ),
        Err(err) => {
            tracing::error!(error = %err, "chat relay failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatEnvelope::fail(err.to_string())),
            )
        }
    }
}

/// Settings status response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsStatus {
    /// Whether a non-blank API key is stored.
    pub api_key_configured: bool,
}

/// Report whether the API key is configured, without revealing it.
async fn settings_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SettingsStatus>, (StatusCode, String)> {
    let api_key = state
        .settings
        .load_api_key()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Settings error: {e}")))?;

    Ok(Json(SettingsStatus {
        api_key_configured: api_key.is_some_and(|key| !key.trim().is_empty()),
    }))
}

/// Settings update request.
#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    /// New API key; blank clears it.
    #[serde(default)]
    pub api_key: String,
    /// Anti-forgery token.
    #[serde(default)]
    pub nonce: String,
}

/// Store a new API key.
async fn update_settings(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(request): Json<SettingsRequest>,
) -> (StatusCode, Json<ChatEnvelope>) {
    if !nonce::verify(&session, &request.nonce).await {
        tracing::warn!("rejected settings update with invalid nonce");
        return forbidden(BAD_NONCE);
    }

    match state
        .settings
        .save_api_key(request.api_key.trim().to_string())
        .await
    {
        Ok(()) => {
            tracing::info!("API key updated");
            (StatusCode::OK, Json(ChatEnvelope::ok("Settings saved")))
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to save API key");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatEnvelope::fail(err.to_string())),
            )
        }
    }
}
