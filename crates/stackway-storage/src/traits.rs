//! Storage traits for the document store abstraction layer.
//!
//! This module defines the contract every document store backend implements.

use async_trait::async_trait;
use serde_json::Value;
use stackway_core::DocumentType;

use crate::error::StorageError;
use crate::types::StoredDocument;

/// The main storage trait all Stackway document store backends implement.
///
/// Documents are keyed by `(type, name)`. Every write assigns a fresh version
/// stamp; conditional writes carry the version the caller read. Backends must
/// be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use stackway_storage::{DocumentStore, StorageError};
/// use stackway_core::DocumentType;
///
/// async fn fetch_service(store: &dyn DocumentStore, name: &str) -> Result<(), StorageError> {
///     let doc = store
///         .get(DocumentType::Service, name)
///         .await?
///         .ok_or_else(|| StorageError::not_found("service", name))?;
///     println!("{}", doc.version_id);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a document by type and name.
    ///
    /// Returns `None` if the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing
    /// documents.
    async fn get(
        &self,
        doc_type: DocumentType,
        name: &str,
    ) -> Result<Option<StoredDocument>, StorageError>;

    /// Writes a document, creating or replacing it.
    ///
    /// If `if_match` is provided, the write only succeeds when the current
    /// version matches; otherwise the write is unconditional.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::VersionConflict` if `if_match` is provided and
    /// does not match the stored version.
    async fn put(
        &self,
        doc_type: DocumentType,
        name: &str,
        body: Value,
        description: Option<String>,
        if_match: Option<&str>,
    ) -> Result<StoredDocument, StorageError>;

    /// Deletes a document by type and name. Deleting a document that does not
    /// exist is a no-op.
    async fn delete(&self, doc_type: DocumentType, name: &str) -> Result<(), StorageError>;

    /// Lists all documents of a given type.
    async fn list(&self, doc_type: DocumentType) -> Result<Vec<StoredDocument>, StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

// Ensure the trait stays object-safe; the gateway holds it as a trait object.
#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_store_object_safe(_: &dyn DocumentStore) {}
}
