//! Conversion of caller-supplied initial content into a valid document tree.

use error_stack::{Report, ResultExt};
use tracing::warn;

use crate::error::NormalizeError;
use crate::tree::{Block, Document};

/// Initial content a client brings when it opens a room.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InitialContent {
    Tree(Document),
    /// Plain text; each line becomes a paragraph.
    Text(String),
    /// A document tree in its JSON form.
    Json(serde_json::Value),
    #[default]
    Empty,
}

impl From<Document> for InitialContent {
    fn from(document: Document) -> Self {
        Self::Tree(document)
    }
}

impl From<&str> for InitialContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

/// Turns initial content into a document that satisfies the tree invariant.
pub trait Normalizer: Send + 'static {
    /// Always yields a valid document.
    fn normalize(&self, content: &InitialContent) -> Document;
}

/// Parses trees and JSON, splits plain text into paragraphs, and repairs the
/// result. Anything unusable becomes [`Document::empty`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalNormalizer;

impl CanonicalNormalizer {
    /// Parse JSON content into a tree.
    ///
    /// A JSON string is treated as plain text.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError`] if the value is neither a string nor a
    /// document tree.
    pub fn parse_json(value: &serde_json::Value) -> Result<Document, Report<NormalizeError>> {
        if let serde_json::Value::String(text) = value {
            return Ok(Self::from_text(text));
        }
        serde_json::from_value(value.clone())
            .change_context(NormalizeError)
            .attach("expected a document tree")
    }

    #[must_use]
    pub fn from_text(text: &str) -> Document {
        Document::new(text.lines().map(Block::text).collect())
    }
}

/// Applies repair inserts until the invariant holds.
fn repair(mut document: Document) -> Result<Document, Report<NormalizeError>> {
    let repairs = document.repair_operations();
    document
        .apply_batch(&repairs)
        .change_context(NormalizeError)?;
    Ok(document)
}

impl Normalizer for CanonicalNormalizer {
    fn normalize(&self, content: &InitialContent) -> Document {
        let parsed = match content {
            InitialContent::Tree(document) => Ok(document.clone()),
            InitialContent::Text(text) => Ok(Self::from_text(text)),
            InitialContent::Json(value) => Self::parse_json(value),
            InitialContent::Empty => Ok(Document::empty()),
        };
        match parsed.and_then(repair) {
            Ok(document) => document,
            Err(err) => {
                warn!(?err, "initial content unusable, starting empty");
                Document::empty()
            }
        }
    }
}
