//! Kubernetes metadata client
//!
//! Pods carry the leadership label; the optional leader record lives in a
//! ConfigMap. Label writes are JSON merge patches on `metadata.labels`, so
//! labels owned by other controllers are left alone.

use crate::metadata::{MetadataClient, MetadataError, ObjectRef};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Metadata client backed by the Kubernetes API
#[derive(Clone)]
pub struct KubernetesMetadata {
    client: Client,
}

impl KubernetesMetadata {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using in-cluster config or the local kubeconfig
    pub async fn try_default() -> Result<Self, MetadataError> {
        Ok(Self::new(Client::try_default().await?))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn patch_record(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MetadataError> {
        let patch = json!({ "data": { key: value } });
        self.config_maps(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == code)
}

#[async_trait]
impl MetadataClient for KubernetesMetadata {
    async fn list_by_label(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<ObjectRef>, MetadataError> {
        let params = ListParams::default().labels(&format!("{}={}", key, value));
        let pods = self.pods(namespace).list(&params).await?;

        Ok(pods
            .into_iter()
            .filter_map(|pod| {
                let name = pod.metadata.name?;
                Some(ObjectRef {
                    namespace: namespace.to_string(),
                    name,
                    labels: pod.metadata.labels.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn patch_label(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MetadataError> {
        let patch = json!({ "metadata": { "labels": { key: value } } });

        match self
            .pods(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                debug!(namespace, pod = name, label = key, value, "Patched pod label");
                Ok(())
            }
            Err(e) if is_status(&e, 404) => Err(MetadataError::not_found(namespace, name)),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_record(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, MetadataError> {
        let config_map = self.config_maps(namespace).get_opt(name).await?;
        Ok(config_map
            .and_then(|cm| cm.data)
            .and_then(|mut data| data.remove(key)))
    }

    async fn write_record(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MetadataError> {
        match self.patch_record(namespace, name, key, value).await {
            Err(MetadataError::Kube(e)) if is_status(&e, 404) => {}
            other => return other,
        }

        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
            ..Default::default()
        };

        match self
            .config_maps(namespace)
            .create(&PostParams::default(), &config_map)
            .await
        {
            Ok(_) => {
                debug!(namespace, config_map = name, "Created leader record");
                Ok(())
            }
            // Lost a create race with another replica; the object exists now.
            Err(e) if is_status(&e, 409) => self.patch_record(namespace, name, key, value).await,
            Err(e) => Err(e.into()),
        }
    }
}
