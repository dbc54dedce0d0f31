//! Command extraction and application for assistant replies.

pub mod applier;
pub mod extractor;

pub use applier::{ApplyOutcome, CommandApplier};
pub use extractor::{CommandExtractor, CommandMatch, ProductCommand, ADD_PRODUCT_COMMAND};
