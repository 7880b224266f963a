//! Cluster metadata contract
//!
//! Leadership is made visible by labelling the objects (pods) that make up a
//! deployment. A [`MetadataClient`] lists those objects by label selector and
//! writes single labels with merge semantics, leaving every other key alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Metadata client errors
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Object not found: {namespace}/{name}")]
    NotFound { namespace: String, name: String },

    #[error("Metadata API error: {0}")]
    Api(String),

    #[cfg(feature = "kubernetes")]
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl MetadataError {
    /// Build a [`MetadataError::NotFound`]
    pub fn not_found(namespace: &str, name: &str) -> Self {
        Self::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Reference to a labelled cluster object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Namespace the object lives in
    pub namespace: String,

    /// Object name (the replica identity for pods)
    pub name: String,

    /// Labels at the time the object was listed
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ObjectRef {
    /// Create a reference with no labels
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Get a label value
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Read and patch key-value metadata on named cluster objects.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// List objects in `namespace` labelled `key=value`
    async fn list_by_label(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<ObjectRef>, MetadataError>;

    /// Set a single label on an object without touching its other metadata
    async fn patch_label(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MetadataError>;

    /// Read `key` from the shared record object `name`.
    ///
    /// A missing object or key reads as `None`.
    async fn read_record(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, MetadataError>;

    /// Write `key` into the shared record object `name`, creating it when missing.
    async fn write_record(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MetadataError>;
}
