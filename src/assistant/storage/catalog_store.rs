//! Catalog persistence for entries created from assistant commands.

use std::fmt;

use chrono::Utc;
use rusqlite::OptionalExtension;
use tokio::sync::Mutex;
use tokio_rusqlite::Connection;

use crate::assistant::core::config::StorageConfig;
use crate::assistant::core::errors::{AssistantError, AssistantResult};
use crate::assistant::storage::StoreFuture;

/// Metadata key for the display price.
pub const PRICE_META_KEY: &str = "_price";
/// Metadata key for the base price.
pub const REGULAR_PRICE_META_KEY: &str = "_regular_price";

/// Entry type used for products.
pub const PRODUCT_ENTRY_TYPE: &str = "product";
/// Status of an immediately visible entry.
pub const PUBLISH_STATUS: &str = "publish";

/// Identifier of a catalog entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fields of a new catalog entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewCatalogEntry {
    /// Plain-text title.
    pub title: String,
    /// Entry type, e.g. `product`.
    pub entry_type: String,
    /// Publication status, e.g. `publish`.
    pub status: String,
}

impl NewCatalogEntry {
    /// A product that is published immediately.
    #[must_use]
    pub fn published_product(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entry_type: PRODUCT_ENTRY_TYPE.to_string(),
            status: PUBLISH_STATUS.to_string(),
        }
    }
}

/// A stored catalog entry with its metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    /// Entry identifier.
    pub id: EntryId,
    /// Plain-text title.
    pub title: String,
    /// Entry type.
    pub entry_type: String,
    /// Publication status.
    pub status: String,
    /// Metadata pairs in write order.
    pub meta: Vec<(String, String)>,
}

impl CatalogEntry {
    /// Look up a metadata value by key.
    #[must_use]
    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Catalog trait.
pub trait Catalog: Send + Sync {
    /// Create an entry and return its identifier.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create_entry(&self, entry: NewCatalogEntry) -> StoreFuture<'_, AssistantResult<EntryId>>;

    /// Set (insert or overwrite) a metadata value on an entry.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn set_meta(
        &self,
        entry_id: EntryId,
        key: &'static str,
        value: String,
    ) -> StoreFuture<'_, AssistantResult<()>>;
}

/// `SQLite` implementation of the catalog.
pub struct SqliteCatalog {
    conn: Connection,
}

impl SqliteCatalog {
    /// Initialize the catalog at the configured path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> AssistantResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(conn).await
    }

    /// Initialize the catalog in memory.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn in_memory() -> AssistantResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> AssistantResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS catalog_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    entry_type TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS catalog_entry_meta (
                    entry_id INTEGER NOT NULL REFERENCES catalog_entries(id),
                    meta_key TEXT NOT NULL,
                    meta_value TEXT NOT NULL,
                    PRIMARY KEY (entry_id, meta_key)
                );",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }
}

impl Catalog for SqliteCatalog {
    fn create_entry(&self, entry: NewCatalogEntry) -> StoreFuture<'_, AssistantResult<EntryId>> {
        Box::pin(async move {
            let created_at = Utc::now().timestamp_millis();
            let id = self
                .conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO catalog_entries (title, entry_type, status, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![entry.title, entry.entry_type, entry.status, created_at],
                    )?;
                    Ok(conn.last_insert_rowid())
                })
                .await?;
            Ok(EntryId(id))
        })
    }

    fn set_meta(
        &self,
        entry_id: EntryId,
        key: &'static str,
        value: String,
    ) -> StoreFuture<'_, AssistantResult<()>> {
        Box::pin(async move {
            let affected = self
                .conn
                .call(move |conn| {
                    let exists = conn
                        .query_row(
                            "SELECT 1 FROM catalog_entries WHERE id = ?1",
                            rusqlite::params![entry_id.0],
                            |row| row.get::<_, i64>(0),
                        )
                        .optional()?;
                    if exists.is_none() {
                        return Ok(0);
                    }
                    let affected = conn.execute(
                        "INSERT INTO catalog_entry_meta (entry_id, meta_key, meta_value)
                         VALUES (?1, ?2, ?3)
                         ON CONFLICT(entry_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
                        rusqlite::params![entry_id.0, key, value],
                    )?;
                    Ok(affected)
                })
                .await?;

            if affected == 0 {
                return Err(AssistantError::InvalidRecord(format!(
                    "catalog entry {entry_id} does not exist"
                )));
            }
            Ok(())
        })
    }
}

/// In-process catalog, used for ephemeral runs and tests.
#[derive(Default)]
pub struct MemoryCatalog {
    entries: Mutex<Vec<CatalogEntry>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries, oldest first.
    pub async fn entries(&self) -> Vec<CatalogEntry> {
        self.entries.lock().await.clone()
    }
}

impl Catalog for MemoryCatalog {
    fn create_entry(&self, entry: NewCatalogEntry) -> StoreFuture<'_, AssistantResult<EntryId>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let next = i64::try_from(entries.len())
                .map_err(|_| AssistantError::InvalidRecord("catalog is full".to_string()))?
                + 1;
            let id = EntryId(next);
            entries.push(CatalogEntry {
                id,
                title: entry.title,
                entry_type: entry.entry_type,
                status: entry.status,
                meta: Vec::new(),
            });
            Ok(id)
        })
    }

    fn set_meta(
        &self,
        entry_id: EntryId,
        key: &'static str,
        value: String,
    ) -> StoreFuture<'_, AssistantResult<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .iter_mut()
                .find(|entry| entry.id == entry_id)
                .ok_or_else(|| {
                    AssistantError::InvalidRecord(format!("catalog entry {entry_id} does not exist"))
                })?;
            match entry.meta.iter_mut().find(|(k, _)| k == key) {
                Some((_, existing)) => *existing = value,
                None => entry.meta.push((key.to_string(), value)),
            }
            Ok(())
        })
    }
}
