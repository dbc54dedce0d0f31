//! Persistent storage for settings and catalog entries.

pub mod catalog_store;
pub mod settings_store;

use std::future::Future;
use std::pin::Pin;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use catalog_store::{
    Catalog, CatalogEntry, EntryId, MemoryCatalog, NewCatalogEntry, SqliteCatalog,
    PRICE_META_KEY, REGULAR_PRICE_META_KEY,
};
pub use settings_store::{MemorySettingsStore, SettingsStore, SqliteSettingsStore};
