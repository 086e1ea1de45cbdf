use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use serde_json::Value;
use stackway_core::DocumentType;
use stackway_storage::{DocumentStore, StorageError, StoredDocument};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

pub type StorageKey = String; // Format: "doc_type/name"

pub(crate) fn make_storage_key(doc_type: DocumentType, name: &str) -> StorageKey {
    format!("{doc_type}/{name}")
}

/// In-memory document store backend using a papaya lock-free HashMap.
///
/// Provides:
/// - Lock-free concurrent access via papaya::HashMap
/// - Versioned writes with conditional-write (CAS) support
/// - Full coverage of the `DocumentStore` contract for tests and single-node
///   deployments
#[derive(Debug)]
pub struct InMemoryStore {
    data: Arc<PapayaHashMap<StorageKey, StoredDocument>>,
    /// Atomic counter for generating version IDs
    version_counter: AtomicU64,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(PapayaHashMap::new()),
            version_counter: AtomicU64::new(1),
        }
    }

    /// Generates the next version ID.
    fn next_version(&self) -> String {
        self.version_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    /// Number of stored documents across all types.
    pub fn count(&self) -> usize {
        let guard = self.data.pin();
        guard.len()
    }

    /// Number of stored documents of one type.
    pub fn count_by_type(&self, doc_type: DocumentType) -> usize {
        let prefix = format!("{doc_type}/");
        let guard = self.data.pin();
        guard.keys().filter(|key| key.starts_with(&prefix)).count()
    }

    pub fn exists(&self, doc_type: DocumentType, name: &str) -> bool {
        let key = make_storage_key(doc_type, name);
        let guard = self.data.pin();
        guard.contains_key(&key)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(
        &self,
        doc_type: DocumentType,
        name: &str,
    ) -> Result<Option<StoredDocument>, StorageError> {
        let key = make_storage_key(doc_type, name);
        let guard = self.data.pin();
        Ok(guard.get(&key).cloned())
    }

    async fn put(
        &self,
        doc_type: DocumentType,
        name: &str,
        body: Value,
        description: Option<String>,
        if_match: Option<&str>,
    ) -> Result<StoredDocument, StorageError> {
        let key = make_storage_key(doc_type, name);
        let guard = self.data.pin();

        if let Some(expected) = if_match {
            match guard.get(&key) {
                Some(existing) if existing.version_id != expected => {
                    return Err(StorageError::version_conflict(
                        doc_type.to_string(),
                        name,
                        expected,
                        existing.version_id.clone(),
                    ));
                }
                None => {
                    return Err(StorageError::version_conflict(
                        doc_type.to_string(),
                        name,
                        expected,
                        "<absent>",
                    ));
                }
                Some(_) => {}
            }
        }

        let stored = StoredDocument {
            doc_type,
            name: name.to_string(),
            version_id: self.next_version(),
            body,
            description,
            last_updated: OffsetDateTime::now_utc(),
        };
        guard.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, doc_type: DocumentType, name: &str) -> Result<(), StorageError> {
        let key = make_storage_key(doc_type, name);
        let guard = self.data.pin();
        guard.remove(&key);
        Ok(())
    }

    async fn list(&self, doc_type: DocumentType) -> Result<Vec<StoredDocument>, StorageError> {
        let prefix = format!("{doc_type}/");
        let guard = self.data.pin();
        let mut documents: Vec<StoredDocument> = guard
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, doc)| doc.clone())
            .collect();
        documents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(documents)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
