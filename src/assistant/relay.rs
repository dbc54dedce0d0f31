//! Message relay between the chat page and the completion API.
//!
//! Each `send` is a read-modify-write of the whole history: load, append the
//! user and assistant turns, save. Concurrent sends are not serialized, so
//! the later save wins and the earlier exchange is lost.

use std::sync::Arc;

use crate::assistant::command::applier::CommandApplier;
use crate::assistant::core::errors::{AssistantError, AssistantResult};
use crate::assistant::core::turn::ConversationTurn;
use crate::assistant::storage::catalog_store::Catalog;
use crate::assistant::storage::settings_store::SettingsStore;
use crate::assistant::text::TextSanitizer;
use crate::llm::openai_chat::CompletionBackend;

/// Instruction prepended to every completion call; never persisted.
pub const SYSTEM_PROMPT: &str = "You are a store assistant for an online shop admin. When the user asks to perform a store task such as adding a product, respond in natural language and also include a JSON block describing the action. Use the format {\"command\":\"add_product\",\"name\":\"NAME\",\"price\":PRICE}. If no action is needed, just reply normally.";

/// Reply returned when no API credential is stored.
pub const API_KEY_MISSING_REPLY: &str = "API key not set";
/// Reply returned when the API payload lacks a message.
pub const NO_RESPONSE_REPLY: &str = "No response from API";

/// Relays operator messages to the completion API and applies commands.
pub struct MessageRelay {
    settings: Arc<dyn SettingsStore>,
    backend: Arc<dyn CompletionBackend>,
    applier: CommandApplier,
    sanitizer: TextSanitizer,
}

impl MessageRelay {
    /// Build a relay over the given collaborators.
    ///
    /// # Errors
    /// Returns an error if the text patterns fail to compile.
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        backend: Arc<dyn CompletionBackend>,
        catalog: Arc<dyn Catalog>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            settings,
            backend,
            applier: CommandApplier::new(catalog)?,
            sanitizer: TextSanitizer::new()?,
        })
    }

    /// Send one operator message and return the reply text.
    ///
    /// Transport failures and malformed API payloads come back as reply text
    /// and are recorded in history like any other reply.
    ///
    /// # Errors
    /// Returns [`AssistantError::EmptyMessage`] for blank input, or a storage
    /// error if history cannot be loaded or saved.
    pub async fn send(&self, text: &str) -> AssistantResult<String> {
        let message = self.sanitizer.sanitize(text);
        if message.is_empty() {
            return Err(AssistantError::EmptyMessage);
        }

        let api_key = self
            .settings
            .load_api_key()
            .await?
            .map(|key| key.trim().to_string())
            .unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("completion API key is not configured");
            return Ok(API_KEY_MISSING_REPLY.to_string());
        }

        let mut history = self.settings.load_history().await?;

        let mut outbound = Vec::with_capacity(history.len() + 2);
        outbound.push(ConversationTurn::system(SYSTEM_PROMPT));
        outbound.extend(history.iter().cloned());
        outbound.push(ConversationTurn::user(message.clone()));

        let reply = match self.backend.complete(&api_key, &outbound).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                tracing::warn!("completion response carried no message content");
                NO_RESPONSE_REPLY.to_string()
            }
            Err(err) => {
                tracing::warn!(error = %err, "completion request failed");
                err.to_string()
            }
        };

        history.push(ConversationTurn::user(message));
        history.push(ConversationTurn::assistant(reply.clone()));
        let turns = history.len();
        self.settings.save_history(history).await?;
        tracing::debug!(turns, "conversation history saved");

        self.applier.apply(&reply).await;

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::{Barrier, Mutex};

    use crate::assistant::core::turn::TurnRole;
    use crate::assistant::storage::catalog_store::MemoryCatalog;
    use crate::assistant::storage::settings_store::MemorySettingsStore;
    use crate::llm::openai_chat::{CompletionError, CompletionFuture};

    /// Backend that replays scripted replies and records what it was sent.
    struct ScriptedBackend {
        replies: Mutex<Vec<Result<Option<String>, CompletionError>>>,
        calls: AtomicUsize,
        last_request: Mutex<Vec<ConversationTurn>>,
        barrier: Option<Barrier>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<Option<String>, CompletionError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(Vec::new()),
                barrier: None,
            }
        }

        fn reply(text: &str) -> Self {
            Self::new(vec![Ok(Some(text.to_string()))])
        }
    }

    impl CompletionBackend for ScriptedBackend {
        fn complete<'a>(
            &'a self,
            _api_key: &'a str,
            messages: &'a [ConversationTurn],
        ) -> CompletionFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                *self.last_request.lock().await = messages.to_vec();
                if let Some(barrier) = &self.barrier {
                    barrier.wait().await;
                }
                let mut replies = self.replies.lock().await;
                if replies.is_empty() {
                    Ok(None)
                } else {
                    replies.remove(0)
                }
            })
        }
    }

    fn relay(
        settings: Arc<MemorySettingsStore>,
        backend: Arc<ScriptedBackend>,
        catalog: Arc<MemoryCatalog>,
    ) -> MessageRelay {
        MessageRelay::new(settings, backend, catalog).unwrap()
    }

    #[tokio::test]
    async fn test_missing_api_key_returns_sentinel() {
        let settings = Arc::new(MemorySettingsStore::new());
        let backend = Arc::new(ScriptedBackend::reply("unused"));
        let relay = relay(settings.clone(), backend.clone(), Arc::new(MemoryCatalog::new()));

        let reply = relay.send("add a mug").await.unwrap();
        assert_eq!(reply, API_KEY_MISSING_REPLY);
        assert!(settings.load_history().await.unwrap().is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_api_key_counts_as_missing() {
        let settings = Arc::new(MemorySettingsStore::with_api_key("   "));
        let backend = Arc::new(ScriptedBackend::reply("unused"));
        let relay = relay(settings, backend.clone(), Arc::new(MemoryCatalog::new()));

        assert_eq!(relay.send("hello").await.unwrap(), API_KEY_MISSING_REPLY);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_message_rejected_before_any_call() {
        let settings = Arc::new(MemorySettingsStore::with_api_key("sk-test"));
        let backend = Arc::new(ScriptedBackend::reply("unused"));
        let relay = relay(settings.clone(), backend.clone(), Arc::new(MemoryCatalog::new()));

        assert!(matches!(relay.send("").await, Err(AssistantError::EmptyMessage)));
        assert!(matches!(relay.send(" \n\t").await, Err(AssistantError::EmptyMessage)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(settings.load_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_send_appends_both_turns() {
        let settings = Arc::new(MemorySettingsStore::with_api_key("sk-test"));
        settings
            .save_history(vec![
                ConversationTurn::user("earlier"),
                ConversationTurn::assistant("earlier reply"),
            ])
            .await
            .unwrap();
        let backend = Arc::new(ScriptedBackend::reply("You have 3 products."));
        let relay = relay(settings.clone(), backend.clone(), Arc::new(MemoryCatalog::new()));

        let reply = relay.send("how many products?").await.unwrap();
        assert_eq!(reply, "You have 3 products.");

        let history = settings.load_history().await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[2], ConversationTurn::user("how many products?"));
        assert_eq!(history[3], ConversationTurn::assistant("You have 3 products."));
        assert!(history.iter().all(|turn| turn.role != TurnRole::System));
    }

    #[tokio::test]
    async fn test_outbound_messages_carry_system_prompt_and_history() {
        let settings = Arc::new(MemorySettingsStore::with_api_key("sk-test"));
        settings
            .save_history(vec![ConversationTurn::user("earlier")])
            .await
            .unwrap();
        let backend = Arc::new(ScriptedBackend::reply("ok"));
        let relay = relay(settings, backend.clone(), Arc::new(MemoryCatalog::new()));

        relay.send("now").await.unwrap();

        let sent = backend.last_request.lock().await.clone();
        assert_eq!(
            sent,
            vec![
                ConversationTurn::system(SYSTEM_PROMPT),
                ConversationTurn::user("earlier"),
                ConversationTurn::user("now"),
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_response_is_recorded_as_sentinel() {
        let settings = Arc::new(MemorySettingsStore::with_api_key("sk-test"));
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(None)]));
        let relay = relay(settings.clone(), backend, Arc::new(MemoryCatalog::new()));

        assert_eq!(relay.send("hi").await.unwrap(), NO_RESPONSE_REPLY);
        let history = settings.load_history().await.unwrap();
        assert_eq!(history.last(), Some(&ConversationTurn::assistant(NO_RESPONSE_REPLY)));
    }

    #[tokio::test]
    async fn test_transport_error_becomes_reply_text() {
        let settings = Arc::new(MemorySettingsStore::with_api_key("sk-test"));
        let backend = Arc::new(ScriptedBackend::new(vec![Err(CompletionError::Backend(
            "operation timed out".to_string(),
        ))]));
        let relay = relay(settings.clone(), backend, Arc::new(MemoryCatalog::new()));

        assert_eq!(relay.send("hi").await.unwrap(), "operation timed out");
        assert_eq!(settings.load_history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_message_is_sanitized_before_storage() {
        let settings = Arc::new(MemorySettingsStore::with_api_key("sk-test"));
        let backend = Arc::new(ScriptedBackend::reply("ok"));
        let relay = relay(settings.clone(), backend, Arc::new(MemoryCatalog::new()));

        relay.send("  <b>add</b>   a mug \n").await.unwrap();
        let history = settings.load_history().await.unwrap();
        assert_eq!(history[0], ConversationTurn::user("add a mug"));
    }

    #[tokio::test]
    async fn test_reply_command_creates_product() {
        let settings = Arc::new(MemorySettingsStore::with_api_key("sk-test"));
        let catalog = Arc::new(MemoryCatalog::new());
        let backend = Arc::new(ScriptedBackend::reply(
            "Added!\n```json\n{\"command\":\"add_product\",\"name\":\"Widget\",\"price\":9.99}\n```",
        ));
        let relay = relay(settings, backend, catalog.clone());

        relay.send("add a widget for 9.99").await.unwrap();

        let entries = catalog.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Widget");
    }

    #[tokio::test]
    async fn test_concurrent_sends_lose_the_earlier_update() {
        let settings = Arc::new(MemorySettingsStore::with_api_key("sk-test"));
        let mut backend = ScriptedBackend::new(vec![
            Ok(Some("reply one".to_string())),
            Ok(Some("reply two".to_string())),
        ]);
        backend.barrier = Some(Barrier::new(2));
        let backend = Arc::new(backend);
        let relay = relay(settings.clone(), backend, Arc::new(MemoryCatalog::new()));

        let (first, second) = tokio::join!(relay.send("first"), relay.send("second"));
        assert!(first.is_ok());
        assert!(second.is_ok());

        // Both calls read the empty history before either saved.
        let history = settings.load_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[1].role, TurnRole::Assistant);
    }
}
