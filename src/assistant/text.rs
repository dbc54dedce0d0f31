//! Plain-text sanitization for operator input and catalog titles.
//!
//! Markup is never interpreted: `<script>`/`<style>` blocks are dropped with
//! their content, remaining tags are stripped, and whitespace runs collapse
//! to a single space. A `<` only opens a tag when a letter, `/`, `!` or `?`
//! follows it, so comparisons like `5 < 8` survive.

use regex::Regex;

/// Pattern-based sanitizer producing single-line plain text.
pub struct TextSanitizer {
    script_blocks: Regex,
    tags: Regex,
    whitespace: Regex,
}

impl TextSanitizer {
    /// Create a new sanitizer.
    ///
    /// # Errors
    /// Returns an error if any regex pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            script_blocks: Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>")?,
            tags: Regex::new(r"(?s)<[A-Za-z/!?][^>]*>")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Sanitize `input` into trimmed single-line plain text.
    #[must_use]
    pub fn sanitize(&self, input: &str) -> String {
        let without_scripts = self.script_blocks.replace_all(input, "");
        let without_tags = self.tags.replace_all(&without_scripts, "");
        self.whitespace
            .replace_all(&without_tags, " ")
            .trim()
            .to_string()
    }
}
