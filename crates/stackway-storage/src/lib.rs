//! Document store abstraction layer for the Stackway control plane.
//!
//! Defines the [`DocumentStore`] trait implemented by storage backends, the
//! [`DocumentGateway`] that gives the rest of the system typed access to
//! documents, and the shared storage error taxonomy.

pub mod error;
pub mod gateway;
pub mod traits;
pub mod types;

pub use error::{ErrorCategory, StorageError};
pub use gateway::{DocumentGateway, RetryPolicy};
pub use traits::DocumentStore;
pub use types::{StoredDocument, Versioned};
