//! Typed gateway over the raw document store.
//!
//! The gateway is the sole serialization boundary: every other component
//! works with in-memory documents and goes through here to touch storage.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use stackway_core::{
    DocumentType, FunctionalRequirement, InfrastructureBaseDocument, Service,
    StackApplicationTemplate, StackInfrastructureTemplate, StackInstance,
};

use crate::error::StorageError;
use crate::traits::DocumentStore;
use crate::types::{StoredDocument, Versioned};

/// Bounded exponential backoff applied to transient backend failures. Beyond
/// the budget the failure surfaces as-is.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

/// Typed read/write access to catalog, template, and instance documents.
#[derive(Clone)]
pub struct DocumentGateway {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl DocumentGateway {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    async fn get_stored(
        &self,
        doc_type: DocumentType,
        name: &str,
    ) -> Result<Option<StoredDocument>, StorageError> {
        let mut delay = self.retry.base_delay;
        let mut attempt = 0;
        loop {
            match self.store.get(doc_type, name).await {
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(%doc_type, name, attempt, "transient read failure, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                other => return other,
            }
        }
    }

    async fn put_stored(
        &self,
        doc_type: DocumentType,
        name: &str,
        body: Value,
        description: Option<String>,
        if_match: Option<&str>,
    ) -> Result<StoredDocument, StorageError> {
        let mut delay = self.retry.base_delay;
        let mut attempt = 0;
        loop {
            match self
                .store
                .put(doc_type, name, body.clone(), description.clone(), if_match)
                .await
            {
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(%doc_type, name, attempt, "transient write failure, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                other => return other,
            }
        }
    }

    async fn get_required<T: DeserializeOwned>(
        &self,
        doc_type: DocumentType,
        name: &str,
    ) -> Result<T, StorageError> {
        let stored = self
            .get_stored(doc_type, name)
            .await?
            .ok_or_else(|| StorageError::not_found(doc_type.to_string(), name))?;
        Ok(serde_json::from_value(stored.body)?)
    }

    /// Fetches a service catalog entry.
    pub async fn service(&self, name: &str) -> Result<Service, StorageError> {
        self.get_required(DocumentType::Service, name).await
    }

    /// Fetches a functional requirement catalog entry.
    pub async fn functional_requirement(
        &self,
        name: &str,
    ) -> Result<FunctionalRequirement, StorageError> {
        self.get_required(DocumentType::FunctionalRequirement, name)
            .await
    }

    /// Fetches one environment/location/zone base document.
    pub async fn infrastructure_base(
        &self,
        doc_type: DocumentType,
        name: &str,
    ) -> Result<InfrastructureBaseDocument, StorageError> {
        if !doc_type.is_infrastructure_base() {
            return Err(StorageError::internal(format!(
                "{doc_type} is not an infrastructure base type"
            )));
        }
        self.get_required(doc_type, name).await
    }

    /// Fetches a stack application template.
    pub async fn application_template(
        &self,
        name: &str,
    ) -> Result<StackApplicationTemplate, StorageError> {
        self.get_required(DocumentType::StackApplicationTemplate, name)
            .await
    }

    /// Fetches a stack infrastructure template.
    pub async fn infrastructure_template(
        &self,
        name: &str,
    ) -> Result<StackInfrastructureTemplate, StorageError> {
        self.get_required(DocumentType::StackInfrastructureTemplate, name)
            .await
    }

    /// Persists a stack infrastructure template (capability cache refresh).
    pub async fn write_infrastructure_template(
        &self,
        sit: &StackInfrastructureTemplate,
        description: impl Into<String>,
    ) -> Result<(), StorageError> {
        let body = serde_json::to_value(sit)?;
        self.put_stored(
            DocumentType::StackInfrastructureTemplate,
            &sit.name,
            body,
            Some(description.into()),
            None,
        )
        .await?;
        Ok(())
    }

    /// Fetches a stack instance with its version stamp, or `None`.
    pub async fn stack_instance(
        &self,
        name: &str,
    ) -> Result<Option<Versioned<StackInstance>>, StorageError> {
        match self.get_stored(DocumentType::StackInstance, name).await? {
            Some(stored) => {
                let instance: StackInstance = serde_json::from_value(stored.body)?;
                Ok(Some(Versioned::new(instance, stored.version_id)))
            }
            None => Ok(None),
        }
    }

    /// Persists a stack instance, optionally as a conditional write against
    /// the version the caller read. Returns the new version stamp.
    pub async fn write_stack_instance(
        &self,
        instance: &StackInstance,
        if_match: Option<&str>,
    ) -> Result<String, StorageError> {
        let body = serde_json::to_value(instance)?;
        let stored = self
            .put_stored(
                DocumentType::StackInstance,
                &instance.name,
                body,
                instance.meta.description.clone(),
                if_match,
            )
            .await?;
        debug!(instance = %instance.name, version = %stored.version_id, "persisted stack instance");
        Ok(stored.version_id)
    }

    /// Removes a stack instance document.
    pub async fn delete_stack_instance(&self, name: &str) -> Result<(), StorageError> {
        self.store.delete(DocumentType::StackInstance, name).await
    }

    /// Lists stack instances whose name contains the given filter. An empty
    /// filter matches everything.
    pub async fn stack_instances(
        &self,
        name_filter: &str,
    ) -> Result<Vec<StackInstance>, StorageError> {
        let stored = self.store.list(DocumentType::StackInstance).await?;
        let mut instances = Vec::with_capacity(stored.len());
        for doc in stored {
            if !doc.name.contains(name_filter) {
                continue;
            }
            instances.push(serde_json::from_value(doc.body)?);
        }
        Ok(instances)
    }
}
