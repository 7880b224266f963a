// Fault-injecting metadata client

use async_trait::async_trait;
use lodestar_distributed::{MetadataClient, MetadataError, ObjectRef};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A label write observed by [`FaultyMetadataClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPatch {
    pub name: String,
    pub key: String,
    pub value: String,
    pub succeeded: bool,
}

/// Spy wrapper over any [`MetadataClient`] that can fail chosen calls
#[derive(Clone)]
pub struct FaultyMetadataClient<C> {
    inner: C,
    failing_objects: Arc<Mutex<HashSet<String>>>,
    fail_listing: Arc<AtomicBool>,
    patches: Arc<Mutex<Vec<LabelPatch>>>,
    lists: Arc<Mutex<usize>>,
}

impl<C: MetadataClient> FaultyMetadataClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            failing_objects: Arc::new(Mutex::new(HashSet::new())),
            fail_listing: Arc::new(AtomicBool::new(false)),
            patches: Arc::new(Mutex::new(Vec::new())),
            lists: Arc::new(Mutex::new(0)),
        }
    }

    /// Make label writes to `name` fail
    pub fn fail_patches_for(&self, name: impl Into<String>) {
        self.failing_objects.lock().insert(name.into());
    }

    /// Let label writes to `name` through again
    pub fn heal(&self, name: &str) {
        self.failing_objects.lock().remove(name);
    }

    /// Make listing fail
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Every label write attempted so far
    pub fn patches(&self) -> Vec<LabelPatch> {
        self.patches.lock().clone()
    }

    /// Label writes attempted on `name`
    pub fn patches_for(&self, name: &str) -> Vec<LabelPatch> {
        self.patches()
            .into_iter()
            .filter(|patch| patch.name == name)
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        *self.lists.lock()
    }

    /// The wrapped client
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: MetadataClient> MetadataClient for FaultyMetadataClient<C> {
    async fn list_by_label(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<ObjectRef>, MetadataError> {
        *self.lists.lock() += 1;
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(MetadataError::Api("injected listing failure".to_string()));
        }
        self.inner.list_by_label(namespace, key, value).await
    }

    async fn patch_label(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MetadataError> {
        let failing = self.failing_objects.lock().contains(name);
        let result = if failing {
            Err(MetadataError::Api(format!("injected patch failure for {}", name)))
        } else {
            self.inner.patch_label(namespace, name, key, value).await
        };

        self.patches.lock().push(LabelPatch {
            name: name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            succeeded: result.is_ok(),
        });
        result
    }

    async fn read_record(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, MetadataError> {
        self.inner.read_record(namespace, name, key).await
    }

    async fn write_record(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MetadataError> {
        let failing = self.failing_objects.lock().contains(name);
        if failing {
            return Err(MetadataError::Api(format!("injected record failure for {}", name)));
        }
        self.inner.write_record(namespace, name, key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestar_distributed::InMemoryMetadata;

    #[tokio::test]
    async fn test_injected_patch_failure() {
        let metadata = InMemoryMetadata::new();
        metadata.insert_object(ObjectRef::new("prod", "r1")).await;
        metadata.insert_object(ObjectRef::new("prod", "r2")).await;

        let client = FaultyMetadataClient::new(metadata.clone());
        client.fail_patches_for("r2");

        assert!(client.patch_label("prod", "r1", "leader", "true").await.is_ok());
        assert!(client.patch_label("prod", "r2", "leader", "false").await.is_err());
        assert_eq!(metadata.label("prod", "r2", "leader").await, None);
        assert!(!client.patches_for("r2")[0].succeeded);

        client.heal("r2");
        assert!(client.patch_label("prod", "r2", "leader", "false").await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_listing_failure() {
        let client = FaultyMetadataClient::new(InMemoryMetadata::new());
        client.fail_listing(true);

        assert!(client.list_by_label("prod", "app", "orders").await.is_err());
        assert_eq!(client.list_calls(), 1);
    }
}
