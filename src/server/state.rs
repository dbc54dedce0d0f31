//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::assistant::core::config::{AssistantConfig, NonceConfig, ServerConfig};
use crate::assistant::relay::MessageRelay;
use crate::assistant::storage::catalog_store::{Catalog, MemoryCatalog, SqliteCatalog};
use crate::assistant::storage::settings_store::{
    MemorySettingsStore, SettingsStore, SqliteSettingsStore,
};
use crate::llm::openai_chat::{CompletionBackend, OpenAiChatClient};

use super::session::BoundedSessionStore;

/// Shared application state.
pub struct AppState {
    /// Relay handling chat messages.
    pub relay: MessageRelay,
    /// Settings storage (API key, history).
    pub settings: Arc<dyn SettingsStore>,
    /// Sessions carrying the anti-forgery tokens.
    pub sessions: BoundedSessionStore,
    /// Session lifetime and cap.
    pub nonce: NonceConfig,
    /// Origin policy and cookie flags.
    pub server: ServerConfig,
}

impl AppState {
    /// Assemble state from already-built collaborators.
    ///
    /// # Errors
    /// Returns an error if the relay cannot be built.
    pub fn from_parts(
        config: &AssistantConfig,
        settings: Arc<dyn SettingsStore>,
        backend: Arc<dyn CompletionBackend>,
        catalog: Arc<dyn Catalog>,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let relay = MessageRelay::new(settings.clone(), backend, catalog)?;
        Ok(Arc::new(Self {
            relay,
            settings,
            sessions: BoundedSessionStore::new(config.nonce.max_sessions),
            nonce: config.nonce.clone(),
            server: config.server.clone(),
        }))
    }

    /// Create state backed by `SQLite` (or memory when `storage.ephemeral`)
    /// and the HTTP completion client.
    ///
    /// # Errors
    /// Returns an error if storage or the HTTP client cannot be created.
    pub async fn new(
        config: &AssistantConfig,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let (settings, catalog): (Arc<dyn SettingsStore>, Arc<dyn Catalog>) =
            if config.storage.ephemeral {
                tracing::warn!("ephemeral storage: settings and catalog are lost on exit");
                (
                    Arc::new(MemorySettingsStore::new()),
                    Arc::new(MemoryCatalog::new()),
                )
            } else {
                let settings = SqliteSettingsStore::new(&config.storage)
                    .await
                    .map_err(|e| format!("Failed to open settings store: {e}"))?;
                let catalog = SqliteCatalog::new(&config.storage)
                    .await
                    .map_err(|e| format!("Failed to open catalog: {e}"))?;
                (Arc::new(settings), Arc::new(catalog))
            };

        let backend = OpenAiChatClient::new(&config.llm)
            .map_err(|e| format!("Failed to create completion client: {e}"))?;
        tracing::info!(model = %backend.model(), endpoint = %config.llm.endpoint, "completion client ready");

        Self::from_parts(config, settings, Arc::new(backend), catalog)
    }
}
