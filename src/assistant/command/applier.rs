//! Executes extracted commands against the catalog.
//!
//! `apply` never fails from the caller's point of view: every path ends in an
//! [`ApplyOutcome`] that is logged and handed back for inspection.

use std::sync::Arc;

use crate::assistant::command::extractor::{CommandExtractor, CommandMatch, ProductCommand};
use crate::assistant::core::errors::AssistantResult;
use crate::assistant::storage::catalog_store::{
    Catalog, EntryId, NewCatalogEntry, PRICE_META_KEY, REGULAR_PRICE_META_KEY,
};
use crate::assistant::text::TextSanitizer;

/// What happened when a reply was applied.
#[derive(Clone, Debug, PartialEq)]
pub enum ApplyOutcome {
    /// The reply carried no command.
    NoCommand,
    /// A command-shaped span failed to parse.
    Malformed(String),
    /// The object named a command other than `add_product`.
    Unsupported(String),
    /// The command had no usable product name.
    MissingName,
    /// A product was created.
    Created {
        /// New entry identifier.
        entry_id: EntryId,
        /// Sanitized title.
        title: String,
        /// Price written to both price fields, if any.
        price: Option<f64>,
    },
    /// The product was created but writing its price failed.
    PriceNotWritten {
        /// New entry identifier.
        entry_id: EntryId,
        /// Storage error message.
        error: String,
    },
    /// The catalog rejected the new entry.
    CreateFailed(String),
}

impl ApplyOutcome {
    /// Whether a catalog entry now exists because of this reply.
    #[must_use]
    pub const fn created_entry(&self) -> Option<EntryId> {
        match self {
            Self::Created { entry_id, .. } | Self::PriceNotWritten { entry_id, .. } => {
                Some(*entry_id)
            }
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            Self::NoCommand => tracing::debug!("reply carried no catalog command"),
            Self::Malformed(err) => tracing::warn!(error = %err, "ignoring malformed command"),
            Self::Unsupported(command) => {
                tracing::warn!(command = %command, "ignoring unsupported command");
            }
            Self::MissingName => tracing::warn!("ignoring add_product without a name"),
            Self::Created {
                entry_id,
                title,
                price,
            } => tracing::info!(%entry_id, %title, ?price, "created catalog product"),
            Self::PriceNotWritten { entry_id, error } => {
                tracing::warn!(%entry_id, error = %error, "created product without price");
            }
            Self::CreateFailed(err) => tracing::warn!(error = %err, "catalog create failed"),
        }
    }
}

/// Detects commands in replies and applies them to a catalog.
pub struct CommandApplier {
    extractor: CommandExtractor,
    sanitizer: TextSanitizer,
    catalog: Arc<dyn Catalog>,
}

impl CommandApplier {
    /// Create an applier writing to `catalog`.
    ///
    /// # Errors
    /// Returns an error if the extraction patterns fail to compile.
    pub fn new(catalog: Arc<dyn Catalog>) -> Result<Self, regex::Error> {
        Ok(Self {
            extractor: CommandExtractor::new()?,
            sanitizer: TextSanitizer::new()?,
            catalog,
        })
    }

    /// Scan `reply_text` and execute an `add_product` command if present.
    pub async fn apply(&self, reply_text: &str) -> ApplyOutcome {
        let outcome = match self.extractor.extract(reply_text) {
            CommandMatch::NotFound => ApplyOutcome::NoCommand,
            CommandMatch::Malformed(err) => ApplyOutcome::Malformed(err),
            CommandMatch::Unsupported(command) => ApplyOutcome::Unsupported(command),
            CommandMatch::MissingName => ApplyOutcome::MissingName,
            CommandMatch::AddProduct(command) => self.add_product(command).await,
        };
        outcome.log();
        outcome
    }

    async fn add_product(&self, command: ProductCommand) -> ApplyOutcome {
        let title = self.sanitizer.sanitize(&command.name);
        if title.is_empty() {
            return ApplyOutcome::MissingName;
        }

        let entry_id = match self
            .catalog
            .create_entry(NewCatalogEntry::published_product(title.clone()))
            .await
        {
            Ok(id) => id,
            Err(err) => return ApplyOutcome::CreateFailed(err.to_string()),
        };

        if let Some(price) = command.price {
            if let Err(err) = self.write_price(entry_id, price).await {
                return ApplyOutcome::PriceNotWritten {
                    entry_id,
                    error: err.to_string(),
                };
            }
        }

        ApplyOutcome::Created {
            entry_id,
            title,
            price: command.price,
        }
    }

    async fn write_price(&self, entry_id: EntryId, price: f64) -> AssistantResult<()> {
        let value = price.to_string();
        self.catalog
            .set_meta(entry_id, PRICE_META_KEY, value.clone())
            .await?;
        self.catalog
            .set_meta(entry_id, REGULAR_PRICE_META_KEY, value)
            .await
    }
}
