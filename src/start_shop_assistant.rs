//! Startup helpers for the shop assistant server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::assistant::core::config::AssistantConfig;
use crate::server::{self, AppState};

/// Environment variable that seeds the stored API key at startup.
const API_KEY_ENV: &str = "SHOP_ASSISTANT_API_KEY";

/// Run the server until Ctrl+C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();

    tracing::info!("Starting shop assistant v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve(&config)) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    tracing::info!("Shop assistant stopped");
    ExitCode::SUCCESS
}

/// Install the global tracing subscriber; `RUST_LOG` refines the filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

/// Load and validate configuration from the environment.
///
/// # Errors
/// Returns an error if a value is malformed or out of range.
pub fn load_config() -> Result<AssistantConfig, Box<dyn std::error::Error + Send + Sync>> {
    let config = AssistantConfig::from_env()?;
    config.validate()?;
    tracing::info!(
        port = config.server.port,
        db = %config.storage.sqlite_path.display(),
        model = %config.llm.model,
        "configuration loaded"
    );
    Ok(config)
}

/// Build application state and seed the API key from the environment if set.
///
/// # Errors
/// Returns an error if state creation or seeding fails.
pub async fn initialize(
    config: &AssistantConfig,
) -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState::new(config).await?;

    if let Some(api_key) = std::env::var(API_KEY_ENV)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
    {
        state.settings.save_api_key(api_key).await?;
        tracing::info!("API key seeded from {API_KEY_ENV}");
    }

    Ok(state)
}

/// Initialize state and serve until the shutdown signal.
///
/// # Errors
/// Returns an error if initialization or the server fails.
pub async fn serve(
    config: &AssistantConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = initialize(config).await?;
    server::run_server_with_shutdown(
        state,
        config.server.port,
        &config.server.static_dir,
        shutdown_signal(),
    )
    .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
