//! Document model
//!
//! Documents and their authoritative tags belong to the external corpus.
//! Two identities are kept apart on purpose:
//! - `DocumentId` is the internal row id. It changes whenever the corpus
//!   merges, deduplicates or rescans a document.
//! - `ExternalDocId` is the durable identity assigned by the upstream source.
//!   The approved rule ledger is keyed by it and only ever reaches a
//!   `DocumentId` through the identity resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal row id of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(i64);

impl DocumentId {
    /// Creates a new document ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the underlying ID value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable identity of a document, stable across corpus regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalDocId(String);

impl ExternalDocId {
    /// Creates a new external ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalDocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document as currently known to the corpus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Internal row id
    pub id: DocumentId,
    /// Durable external identity
    pub external_id: ExternalDocId,
    /// Display name
    pub name: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// An authoritative tag row on a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentTag {
    pub id: i64,
    pub document_id: DocumentId,
    pub tag_name: String,
    pub tag_category: String,
}

/// A (name, category) pair identifying a tag independent of any document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagLabel {
    pub category: String,
    pub name: String,
}

impl TagLabel {
    /// Build a label from raw input, trimming both parts.
    ///
    /// Returns `None` when either part is blank.
    pub fn parse(name: &str, category: &str) -> Option<Self> {
        let name = name.trim();
        let category = category.trim();
        if name.is_empty() || category.is_empty() {
            return None;
        }
        Some(Self {
            category: category.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for TagLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_serializes_as_raw_integer() {
        let id = DocumentId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
    }

    #[test]
    fn test_external_id_serializes_as_raw_string() {
        let id = ExternalDocId::new("1AbCdEf");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""1AbCdEf""#);
        assert_eq!(id.to_string(), "1AbCdEf");
    }

    #[test]
    fn test_tag_label_trims_input() {
        let label = TagLabel::parse("  Naruto ", " Series").unwrap();
        assert_eq!(label.name, "Naruto");
        assert_eq!(label.category, "Series");
        assert_eq!(label.to_string(), "Series/Naruto");
    }

    #[test]
    fn test_tag_label_rejects_blank_parts() {
        assert!(TagLabel::parse("", "Series").is_none());
        assert!(TagLabel::parse("Naruto", "   ").is_none());
    }

    #[test]
    fn test_tag_labels_order_by_category_then_name() {
        let mut labels = vec![
            TagLabel::parse("b", "Series").unwrap(),
            TagLabel::parse("z", "Genre").unwrap(),
            TagLabel::parse("a", "Series").unwrap(),
        ];
        labels.sort();
        let rendered: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        assert_eq!(rendered, vec!["Genre/z", "Series/a", "Series/b"]);
    }
}
