//! Completion API clients.

pub mod openai_chat;

pub use openai_chat::{CompletionBackend, CompletionError, CompletionFuture, OpenAiChatClient};
