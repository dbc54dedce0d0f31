//! Core assistant types: configuration, errors and conversation turns.

pub mod config;
pub mod errors;
pub mod turn;

pub use config::{AssistantConfig, LlmConfig, NonceConfig, ServerConfig, StorageConfig};
pub use errors::{AssistantError, AssistantResult};
pub use turn::{ConversationTurn, TurnRole};
