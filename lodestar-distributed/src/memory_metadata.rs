//! In-memory metadata client (for testing)

use crate::metadata::{MetadataClient, MetadataError, ObjectRef};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type ObjectKey = (String, String);

/// In-memory cluster metadata (for testing/development)
#[derive(Clone, Default)]
pub struct InMemoryMetadata {
    objects: Arc<RwLock<HashMap<ObjectKey, BTreeMap<String, String>>>>,
    records: Arc<RwLock<HashMap<ObjectKey, BTreeMap<String, String>>>>,
}

impl InMemoryMetadata {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object with its labels
    pub async fn insert_object(&self, object: ObjectRef) {
        self.objects
            .write()
            .await
            .insert((object.namespace, object.name), object.labels);
    }

    /// Labels currently set on an object
    pub async fn labels(&self, namespace: &str, name: &str) -> Option<BTreeMap<String, String>> {
        self.objects
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Single label value on an object
    pub async fn label(&self, namespace: &str, name: &str, key: &str) -> Option<String> {
        self.labels(namespace, name)
            .await
            .and_then(|labels| labels.get(key).cloned())
    }

    /// Value stored in a shared record
    pub async fn record(&self, namespace: &str, name: &str, key: &str) -> Option<String> {
        self.records
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|data| data.get(key).cloned())
    }

    /// Get count of registered objects
    pub async fn count(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl MetadataClient for InMemoryMetadata {
    async fn list_by_label(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<ObjectRef>, MetadataError> {
        let objects = self.objects.read().await;
        let mut matching: Vec<ObjectRef> = objects
            .iter()
            .filter(|((ns, _), labels)| {
                ns == namespace && labels.get(key).map(String::as_str) == Some(value)
            })
            .map(|((ns, name), labels)| ObjectRef {
                namespace: ns.clone(),
                name: name.clone(),
                labels: labels.clone(),
            })
            .collect();

        matching.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matching)
    }

    async fn patch_label(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MetadataError> {
        self.objects
            .write()
            .await
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| MetadataError::not_found(namespace, name))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn read_record(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, MetadataError> {
        Ok(self.record(namespace, name, key).await)
    }

    async fn write_record(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MetadataError> {
        self.records
            .write()
            .await
            .entry((namespace.to_string(), name.to_string()))
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
