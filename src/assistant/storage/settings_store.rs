//! Key-value settings storage for the API credential and conversation history.

use chrono::Utc;
use rusqlite::OptionalExtension;
use tokio::sync::Mutex;
use tokio_rusqlite::Connection;

use crate::assistant::core::config::StorageConfig;
use crate::assistant::core::errors::AssistantResult;
use crate::assistant::core::turn::ConversationTurn;
use crate::assistant::storage::StoreFuture;

/// Settings key holding the completion API credential.
pub const API_KEY_SETTING: &str = "api_key";
/// Settings key holding the serialized conversation history.
pub const HISTORY_SETTING: &str = "history";

/// Settings store trait.
///
/// History is always written as a whole replacement; there is no append or
/// compare-and-swap operation.
pub trait SettingsStore: Send + Sync {
    /// Load the stored API credential, if any.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn load_api_key(&self) -> StoreFuture<'_, AssistantResult<Option<String>>>;

    /// Store the API credential.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn save_api_key(&self, api_key: String) -> StoreFuture<'_, AssistantResult<()>>;

    /// Load the full conversation history, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails or the stored value is corrupt.
    fn load_history(&self) -> StoreFuture<'_, AssistantResult<Vec<ConversationTurn>>>;

    /// Replace the conversation history.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn save_history(&self, history: Vec<ConversationTurn>) -> StoreFuture<'_, AssistantResult<()>>;
}

/// `SQLite` implementation of settings storage.
pub struct SqliteSettingsStore {
    conn: Connection,
    table: String,
}

impl SqliteSettingsStore {
    /// Initialize the settings store at the configured path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> AssistantResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(conn).await
    }

    /// Initialize the settings store in memory.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn in_memory() -> AssistantResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> AssistantResult<Self> {
        let table = "settings".to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    name TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                )"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }

    async fn get(&self, name: &'static str) -> AssistantResult<Option<String>> {
        let table = self.table.clone();
        let value = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        &format!("SELECT value FROM {table} WHERE name = ?1"),
                        rusqlite::params![name],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    async fn put(&self, name: &'static str, value: String) -> AssistantResult<()> {
        let table = self.table.clone();
        let updated_at = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (name, value, updated_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(name) DO UPDATE SET value = excluded.value,
                                                        updated_at = excluded.updated_at"
                    ),
                    rusqlite::params![name, value, updated_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn load_api_key(&self) -> StoreFuture<'_, AssistantResult<Option<String>>> {
        Box::pin(async move { self.get(API_KEY_SETTING).await })
    }

    fn save_api_key(&self, api_key: String) -> StoreFuture<'_, AssistantResult<()>> {
        Box::pin(async move { self.put(API_KEY_SETTING, api_key).await })
    }

    fn load_history(&self) -> StoreFuture<'_, AssistantResult<Vec<ConversationTurn>>> {
        Box::pin(async move {
            match self.get(HISTORY_SETTING).await? {
                Some(json) => Ok(serde_json::from_str(&json)?),
                None => Ok(Vec::new()),
            }
        })
    }

    fn save_history(&self, history: Vec<ConversationTurn>) -> StoreFuture<'_, AssistantResult<()>> {
        Box::pin(async move {
            let json = serde_json::to_string(&history)?;
            self.put(HISTORY_SETTING, json).await
        })
    }
}

/// In-process settings store, used for ephemeral runs and tests.
#[derive(Default)]
pub struct MemorySettingsStore {
    api_key: Mutex<Option<String>>,
    history: Mutex<Vec<ConversationTurn>>,
}

impl MemorySettingsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with a preconfigured API credential.
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Mutex::new(Some(api_key.into())),
            history: Mutex::new(Vec::new()),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load_api_key(&self) -> StoreFuture<'_, AssistantResult<Option<String>>> {
        Box::pin(async move { Ok(self.api_key.lock().await.clone()) })
    }

    fn save_api_key(&self, api_key: String) -> StoreFuture<'_, AssistantResult<()>> {
        Box::pin(async move {
            *self.api_key.lock().await = Some(api_key);
            Ok(())
        })
    }

    fn load_history(&self) -> StoreFuture<'_, AssistantResult<Vec<ConversationTurn>>> {
        Box::pin(async move { Ok(self.history.lock().await.clone()) })
    }

    fn save_history(&self, history: Vec<ConversationTurn>) -> StoreFuture<'_, AssistantResult<()>> {
        Box::pin(async move {
            *self.history.lock().await = history;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_history_roundtrip() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();
        assert!(store.load_history().await.unwrap().is_empty());

        let history = vec![
            ConversationTurn::user("hello"),
            ConversationTurn::assistant("hi there"),
        ];
        store.save_history(history.clone()).await.unwrap();
        assert_eq!(store.load_history().await.unwrap(), history);
    }

    #[tokio::test]
    async fn test_sqlite_history_is_replaced_not_merged() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();
        store
            .save_history(vec![ConversationTurn::user("first")])
            .await
            .unwrap();
        store
            .save_history(vec![ConversationTurn::user("second")])
            .await
            .unwrap();

        let history = store.load_history().await.unwrap();
        assert_eq!(history, vec![ConversationTurn::user("second")]);
    }

    #[tokio::test]
    async fn test_sqlite_api_key() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();
        assert_eq!(store.load_api_key().await.unwrap(), None);

        store.save_api_key("sk-test".to_string()).await.unwrap();
        store.save_api_key("sk-rotated".to_string()).await.unwrap();
        assert_eq!(
            store.load_api_key().await.unwrap().as_deref(),
            Some("sk-rotated")
        );
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemorySettingsStore::with_api_key("sk-test");
        assert_eq!(store.load_api_key().await.unwrap().as_deref(), Some("sk-test"));

        store
            .save_history(vec![ConversationTurn::assistant("ok")])
            .await
            .unwrap();
        assert_eq!(store.load_history().await.unwrap().len(), 1);
    }
}
