//! Best-effort extraction of an `add_product` command from free-text replies.
//!
//! Two patterns are tried in order: a fenced block labelled `json`, then an
//! inline object whose `command` is `add_product`. The first pattern that
//! matches decides the outcome; a fenced block that fails to parse does not
//! fall back to the inline pattern.

use std::num::FpCategory;

use regex::Regex;
use serde_json::{Map, Value};

/// The only command name this extractor recognizes.
pub const ADD_PRODUCT_COMMAND: &str = "add_product";

/// A parsed `add_product` command.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductCommand {
    /// Raw product name as written by the model.
    pub name: String,
    /// Coerced price, when the object carried one.
    pub price: Option<f64>,
}

/// Result of scanning one reply.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandMatch {
    /// Neither pattern matched.
    NotFound,
    /// A span matched but did not parse as a JSON object.
    Malformed(String),
    /// The object named a different command.
    Unsupported(String),
    /// The object had no usable `name`.
    MissingName,
    /// A well-formed command.
    AddProduct(ProductCommand),
}

/// Pattern-based command extractor.
pub struct CommandExtractor {
    fenced: Regex,
    inline: Regex,
    numeric_prefix: Regex,
}

impl CommandExtractor {
    /// Create a new extractor.
    ///
    /// # Errors
    /// Returns an error if any regex pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            fenced: Regex::new(r"(?i)```json\s*(\{[^`]+\})\s*```")?,
            inline: Regex::new(r#"(?i)\{\s*"command"\s*:\s*"add_product"[^}]*\}"#)?,
            numeric_prefix: Regex::new(r"^\s*[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?")?,
        })
    }

    /// Find the first command-shaped span in `text`.
    #[must_use]
    pub fn find_span<'t>(&self, text: &'t str) -> Option<&'t str> {
        if let Some(caps) = self.fenced.captures(text) {
            return caps.get(1).map(|m| m.as_str());
        }
        self.inline.find(text).map(|m| m.as_str())
    }

    /// Scan `text` and classify what was found.
    #[must_use]
    pub fn extract(&self, text: &str) -> CommandMatch {
        let Some(span) = self.find_span(text) else {
            return CommandMatch::NotFound;
        };

        let object = match serde_json::from_str::<Map<String, Value>>(span) {
            Ok(object) => object,
            Err(err) => return CommandMatch::Malformed(err.to_string()),
        };

        match object.get("command") {
            Some(Value::String(command)) if command.eq_ignore_ascii_case(ADD_PRODUCT_COMMAND) => {}
            Some(other) => return CommandMatch::Unsupported(value_label(other)),
            None => return CommandMatch::Unsupported("<missing>".to_string()),
        }

        let Some(name) = object.get("name").and_then(coerce_name) else {
            return CommandMatch::MissingName;
        };

        let price = match object.get("price") {
            None | Some(Value::Null) => None,
            Some(value) => Some(self.coerce_price(value)),
        };

        CommandMatch::AddProduct(ProductCommand { name, price })
    }

    /// Coerce a JSON value to a price the way a lenient float cast would.
    ///
    /// Numbers pass through, strings use their leading numeric prefix,
    /// booleans map to 1 and 0, everything else is 0.
    #[must_use]
    pub fn coerce_price(&self, value: &Value) -> f64 {
        match value {
            Value::Number(number) => number.as_f64().unwrap_or(0.0),
            Value::String(text) => self
                .numeric_prefix
                .find(text)
                .and_then(|m| m.as_str().trim().parse::<f64>().ok())
                .unwrap_or(0.0),
            Value::Bool(flag) => {
                if *flag {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Null | Value::Array(_) | Value::Object(_) => 0.0,
        }
    }
}

/// Text of a usable `name`, following loose emptiness rules: blank strings,
/// `"0"`, zero, `false`, `null`, arrays and objects have none; `true` reads
/// as `"1"`.
fn coerce_name(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if text.trim().is_empty() || text == "0" => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number)
            if number
                .as_f64()
                .is_some_and(|n| n.classify() == FpCategory::Zero) =>
        {
            None
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
