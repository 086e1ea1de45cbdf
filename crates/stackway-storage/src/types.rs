//! Data types used by the document store traits.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stackway_core::DocumentType;
use time::OffsetDateTime;

/// A document as stored in the backend, with its version stamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    /// The document type this body belongs to.
    pub doc_type: DocumentType,
    /// The document name, unique within its type.
    pub name: String,
    /// The version ID assigned by the backend at write time.
    pub version_id: String,
    /// The full document content as JSON.
    pub body: Value,
    /// Free-form description of the write, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When this version was written.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

impl StoredDocument {
    /// Creates a new `StoredDocument` stamped with the current time.
    #[must_use]
    pub fn new(
        doc_type: DocumentType,
        name: impl Into<String>,
        version_id: impl Into<String>,
        body: Value,
    ) -> Self {
        Self {
            doc_type,
            name: name.into(),
            version_id: version_id.into(),
            body,
            description: None,
            last_updated: OffsetDateTime::now_utc(),
        }
    }

    /// Sets the write description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A typed document paired with the version stamp it was read at. The version
/// feeds conditional writes for optimistic concurrency.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub version_id: String,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version_id: impl Into<String>) -> Self {
        Self {
            value,
            version_id: version_id.into(),
        }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_document_builder() {
        let doc = StoredDocument::new(
            DocumentType::Service,
            "web",
            "1",
            json!({"name": "web"}),
        )
        .with_description("initial import");
        assert_eq!(doc.name, "web");
        assert_eq!(doc.version_id, "1");
        assert_eq!(doc.description.as_deref(), Some("initial import"));
    }

    #[test]
    fn test_stored_document_serde() {
        let doc = StoredDocument::new(DocumentType::Zone, "z1", "4", json!({"zone": "green"}));
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["doc_type"], "zone");
        assert_eq!(value["body"]["zone"], "green");
        let back: StoredDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back.version_id, "4");
    }

    #[test]
    fn test_versioned_wrapper() {
        let versioned = Versioned::new(7u32, "3");
        assert_eq!(versioned.version_id, "3");
        assert_eq!(versioned.into_inner(), 7);
    }
}
