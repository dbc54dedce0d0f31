//! Shop assistant subsystem.
//!
//! Organized into:
//! - `core`: Configuration, errors and conversation turns
//! - `storage`: Settings and catalog stores with `SQLite` and in-memory backends
//! - `command`: Extraction and application of catalog commands
//! - `relay`: The send-message round trip
//! - `text`: Plain-text sanitization

pub mod command;
pub mod core;
pub mod relay;
pub mod storage;
pub mod text;

// Re-export commonly used types for convenience
pub use command::{ApplyOutcome, CommandApplier, CommandExtractor, CommandMatch, ProductCommand};
pub use self::core::{
    AssistantConfig, AssistantError, AssistantResult, ConversationTurn, LlmConfig, NonceConfig,
    ServerConfig, StorageConfig, TurnRole,
};
pub use relay::{MessageRelay, API_KEY_MISSING_REPLY, NO_RESPONSE_REPLY, SYSTEM_PROMPT};
pub use storage::{
    Catalog, CatalogEntry, EntryId, MemoryCatalog, MemorySettingsStore, NewCatalogEntry,
    SettingsStore, SqliteCatalog, SqliteSettingsStore, StoreFuture,
};
pub use text::TextSanitizer;
