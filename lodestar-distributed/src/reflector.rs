//! Mirror leadership into cluster metadata
//!
//! The [`LeadershipReflector`] is the [`LeadershipCallbacks`] implementation
//! that labels the leader's own object `true` and every peer `false`, and on
//! loss sets only its own label back to `false`.

use crate::config::ElectionConfig;
use crate::error::LeaderError;
use crate::leader::LeadershipCallbacks;
use crate::metadata::MetadataClient;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Key under which the leader identity is recorded
pub const LEADER_INFO_KEY: &str = "leaderPod";

const LEADER: &str = "true";
const NOT_LEADER: &str = "false";

/// Reconciles leadership labels on state transitions
pub struct LeadershipReflector {
    client: Arc<dyn MetadataClient>,
    identity: String,
    namespace: String,
    label_key: String,
    selector_key: String,
    selector_value: String,
    leader_info: Option<String>,
}

impl LeadershipReflector {
    /// Create a reflector for `identity` using the label settings of `config`
    pub fn new(
        client: Arc<dyn MetadataClient>,
        identity: impl Into<String>,
        namespace: impl Into<String>,
        config: &ElectionConfig,
    ) -> Self {
        Self {
            client,
            identity: identity.into(),
            namespace: namespace.into(),
            label_key: config.label_key().to_string(),
            selector_key: config.selector_key().to_string(),
            selector_value: config.selector_value().to_string(),
            leader_info: None,
        }
    }

    /// Also record the leader identity in the shared object `name`
    pub fn with_leader_info(mut self, name: impl Into<String>) -> Self {
        self.leader_info = Some(name.into());
        self
    }

    /// Replica this reflector labels as itself
    pub fn identity(&self) -> &str {
        &self.identity
    }

    async fn record_leader(&self) {
        let Some(record) = &self.leader_info else {
            return;
        };

        match self
            .client
            .write_record(&self.namespace, record, LEADER_INFO_KEY, &self.identity)
            .await
        {
            Ok(()) => debug!(identity = %self.identity, record = %record, "Recorded leader"),
            Err(e) => warn!(identity = %self.identity, record = %record, "Failed to record leader: {}", e),
        }
    }

    async fn clear_leader(&self) {
        let Some(record) = &self.leader_info else {
            return;
        };

        let current = match self
            .client
            .read_record(&self.namespace, record, LEADER_INFO_KEY)
            .await
        {
            Ok(current) => current,
            Err(e) => {
                warn!(identity = %self.identity, record = %record, "Failed to read leader record: {}", e);
                return;
            }
        };

        // Someone else may already have taken over.
        if current.as_deref() != Some(self.identity.as_str()) {
            return;
        }

        if let Err(e) = self
            .client
            .write_record(&self.namespace, record, LEADER_INFO_KEY, "")
            .await
        {
            warn!(identity = %self.identity, record = %record, "Failed to clear leader record: {}", e);
        }
    }
}

#[async_trait]
impl LeadershipCallbacks for LeadershipReflector {
    async fn on_became_leader(&self) -> Result<(), LeaderError> {
        let peers = self
            .client
            .list_by_label(&self.namespace, &self.selector_key, &self.selector_value)
            .await
            .map_err(|e| {
                error!(identity = %self.identity, "Failed to list peers: {}", e);
                e
            })?;

        let mut demoted = 0;
        for peer in peers.iter().filter(|peer| peer.name != self.identity) {
            match self
                .client
                .patch_label(&self.namespace, &peer.name, &self.label_key, NOT_LEADER)
                .await
            {
                Ok(()) => demoted += 1,
                Err(e) => warn!(
                    identity = %self.identity,
                    peer = %peer.name,
                    "Failed to demote peer: {}",
                    e
                ),
            }
        }

        // The lock decides leadership; a missing label must not give it up.
        match self
            .client
            .patch_label(&self.namespace, &self.identity, &self.label_key, LEADER)
            .await
        {
            Ok(()) => info!(
                identity = %self.identity,
                peers = peers.len(),
                demoted,
                "Marked self as leader"
            ),
            Err(e) => error!(
                identity = %self.identity,
                label = %self.label_key,
                "Failed to mark self as leader: {}",
                e
            ),
        }

        self.record_leader().await;
        Ok(())
    }

    async fn on_lost_leadership(&self) -> Result<(), LeaderError> {
        self.client
            .patch_label(&self.namespace, &self.identity, &self.label_key, NOT_LEADER)
            .await?;

        info!(identity = %self.identity, "Marked self as follower");

        self.clear_leader().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_metadata::InMemoryMetadata;
    use crate::metadata::ObjectRef;

    fn config() -> ElectionConfig {
        ElectionConfig::builder("orders")
            .label_key("orders-leader")
            .selector("app", "orders")
            .build()
            .unwrap()
    }

    async fn cluster(names: &[&str]) -> InMemoryMetadata {
        let metadata = InMemoryMetadata::new();
        for name in names {
            metadata
                .insert_object(
                    ObjectRef::new("prod", *name)
                        .with_label("app", "orders")
                        .with_label("orders-leader", "true"),
                )
                .await;
        }
        metadata
    }

    #[tokio::test]
    async fn test_became_leader_labels_self_and_demotes_peers() {
        let metadata = cluster(&["r1", "r2", "r3"]).await;
        let reflector = LeadershipReflector::new(Arc::new(metadata.clone()), "r1", "prod", &config());

        reflector.on_became_leader().await.unwrap();

        assert_eq!(metadata.label("prod", "r1", "orders-leader").await.as_deref(), Some("true"));
        assert_eq!(metadata.label("prod", "r2", "orders-leader").await.as_deref(), Some("false"));
        assert_eq!(metadata.label("prod", "r3", "orders-leader").await.as_deref(), Some("false"));
        assert_eq!(metadata.label("prod", "r2", "app").await.as_deref(), Some("orders"));
    }

    #[tokio::test]
    async fn test_lost_leadership_touches_only_self() {
        let metadata = cluster(&["r1", "r2"]).await;
        let reflector = LeadershipReflector::new(Arc::new(metadata.clone()), "r1", "prod", &config());

        reflector.on_lost_leadership().await.unwrap();

        assert_eq!(metadata.label("prod", "r1", "orders-leader").await.as_deref(), Some("false"));
        assert_eq!(metadata.label("prod", "r2", "orders-leader").await.as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_missing_self_object_keeps_leadership() {
        let metadata = cluster(&["r2"]).await;
        let reflector = LeadershipReflector::new(Arc::new(metadata.clone()), "r1", "prod", &config())
            .with_leader_info("orders-leader-info");

        assert!(reflector.on_became_leader().await.is_ok());
        assert_eq!(metadata.label("prod", "r2", "orders-leader").await.as_deref(), Some("false"));
        assert_eq!(
            metadata.record("prod", "orders-leader-info", LEADER_INFO_KEY).await.as_deref(),
            Some("r1")
        );
    }

    #[tokio::test]
    async fn test_leader_record_written_and_cleared() {
        let metadata = cluster(&["r1", "r2"]).await;
        let reflector = LeadershipReflector::new(Arc::new(metadata.clone()), "r1", "prod", &config())
            .with_leader_info("orders-leader-info");

        reflector.on_became_leader().await.unwrap();
        assert_eq!(
            metadata.record("prod", "orders-leader-info", LEADER_INFO_KEY).await.as_deref(),
            Some("r1")
        );

        reflector.on_lost_leadership().await.unwrap();
        assert_eq!(
            metadata.record("prod", "orders-leader-info", LEADER_INFO_KEY).await.as_deref(),
            Some("")
        );
    }

    #[tokio::test]
    async fn test_leader_record_kept_when_taken_over() {
        let metadata = cluster(&["r1", "r2"]).await;
        metadata
            .write_record("prod", "orders-leader-info", LEADER_INFO_KEY, "r2")
            .await
            .unwrap();
        let reflector = LeadershipReflector::new(Arc::new(metadata.clone()), "r1", "prod", &config())
            .with_leader_info("orders-leader-info");

        reflector.on_lost_leadership().await.unwrap();
        assert_eq!(
            metadata.record("prod", "orders-leader-info", LEADER_INFO_KEY).await.as_deref(),
            Some("r2")
        );
    }
}
