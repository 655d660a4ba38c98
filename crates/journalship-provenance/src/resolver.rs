use std::sync::Arc;

use tracing::warn;

use journalship_types::{ContainerInfo, Event, RoutingMetadata};

use crate::docker::ContainerLookup;
use crate::kubelet::PodLookup;

pub const SUMO_CATEGORY_LABEL: &str = "com.sumologic/sourceCategory";
pub const SUMO_SOURCE_LABEL: &str = "com.sumologic/sourceName";
pub const TRUSTED_TIMESTAMP_LABEL: &str = "com.sumologic/trusted-timestamp";

pub const KUBERNETES_POD_NAME_LABEL: &str = "io.kubernetes.pod.name";
pub const KUBERNETES_POD_NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";
pub const KUBERNETES_CATEGORY_OVERRIDE_LABEL: &str =
    "annotation.io.com.sumologic/sourceCategory";
pub const KUBERNETES_SOURCE_OVERRIDE_LABEL: &str = "annotation.io.com.sumologic/sourceName";

/// Container names the kubelet gives to pod containers start with this
const KUBERNETES_CONTAINER_PREFIX: &str = "k8s_";

/// Maps an entry's provenance to routing metadata
#[derive(Clone)]
pub struct MetadataResolver {
    defaults: Arc<RoutingMetadata>,
    containers: Arc<dyn ContainerLookup>,
    pods: Arc<dyn PodLookup>,
}

impl MetadataResolver {
    pub fn new(
        defaults: Arc<RoutingMetadata>,
        containers: Arc<dyn ContainerLookup>,
        pods: Arc<dyn PodLookup>,
    ) -> Self {
        Self {
            defaults,
            containers,
            pods,
        }
    }

    pub fn defaults(&self) -> &RoutingMetadata {
        &self.defaults
    }

    /// Resolve metadata for an entry. Lookup failures degrade to fallbacks.
    pub async fn resolve(&self, event: &Event) -> RoutingMetadata {
        if !event.is_service_managed() {
            return RoutingMetadata::for_process(&self.defaults, "journald", event.transport());
        }

        let container_id = event.container_id_full();
        if container_id.is_empty() {
            return RoutingMetadata::for_process(
                &self.defaults,
                "systemd",
                event.syslog_identifier(),
            );
        }

        match self.containers.container(container_id).await {
            Ok(Some(container)) => self.for_container(container_id, &container).await,
            Ok(None) => {
                warn!(container_id, "Container not found, using default metadata");
                self.defaults.as_ref().clone()
            }
            Err(e) => {
                warn!(container_id, "Error getting container info: {}", e);
                self.defaults.as_ref().clone()
            }
        }
    }

    async fn for_container(&self, container_id: &str, container: &ContainerInfo) -> RoutingMetadata {
        if container.name.starts_with(KUBERNETES_CONTAINER_PREFIX) {
            return self.for_pod_container(container_id, container).await;
        }

        let defaults = &self.defaults;
        let category = match container.label(SUMO_CATEGORY_LABEL) {
            "" => format!("{}/docker/{}", defaults.category, container.name),
            label => format!("{}/docker/{}", defaults.category, label),
        };
        let source = match container.label(SUMO_SOURCE_LABEL) {
            "" => container.name.clone(),
            label => label.to_string(),
        };
        RoutingMetadata::new(
            source,
            category,
            defaults.host.clone(),
            container.has_label(TRUSTED_TIMESTAMP_LABEL),
        )
    }

    async fn for_pod_container(&self, container_id: &str, container: &ContainerInfo) -> RoutingMetadata {
        let defaults = &self.defaults;
        let namespace = container.label(KUBERNETES_POD_NAMESPACE_LABEL);
        let pod_name = container.label(KUBERNETES_POD_NAME_LABEL);

        // Pods without an owner are grouped under their own name
        let owner = match self.pods.pod_for_container(container_id).await {
            Ok(Some(pod)) => pod.owner.unwrap_or_else(|| pod_name.to_string()),
            Ok(None) => pod_name.to_string(),
            Err(e) => {
                warn!(container_id, "Error getting pod info: {}", e);
                pod_name.to_string()
            }
        };

        let category = match container.label(KUBERNETES_CATEGORY_OVERRIDE_LABEL) {
            "" => format!("{}/kubernetes/{}/{}", defaults.category, namespace, owner),
            label => format!("{}/kubernetes/{}", defaults.category, label),
        };
        let source = match container.label(KUBERNETES_SOURCE_OVERRIDE_LABEL) {
            "" => format!("{}.{}", namespace, pod_name),
            label => format!("{}.{}", namespace, label),
        };
        RoutingMetadata::new(source, category, defaults.host.clone(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProvenanceError, Result};
    use async_trait::async_trait;
    use journalship_types::{PodInfo, fields};
    use std::collections::HashMap;

    struct FakeContainers(HashMap<String, ContainerInfo>);

    #[async_trait]
    impl ContainerLookup for FakeContainers {
        async fn container(&self, full_id: &str) -> Result<Option<ContainerInfo>> {
            Ok(self.0.get(full_id).cloned())
        }
    }

    struct BrokenContainers;

    #[async_trait]
    impl ContainerLookup for BrokenContainers {
        async fn container(&self, _full_id: &str) -> Result<Option<ContainerInfo>> {
            Err(ProvenanceError::Status(500))
        }
    }

    struct FakePods(Option<PodInfo>);

    #[async_trait]
    impl PodLookup for FakePods {
        async fn pod_for_container(&self, _container_id: &str) -> Result<Option<PodInfo>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenPods;

    #[async_trait]
    impl PodLookup for BrokenPods {
        async fn pod_for_container(&self, _container_id: &str) -> Result<Option<PodInfo>> {
            Err(ProvenanceError::Timeout(std::time::Duration::from_secs(2)))
        }
    }

    fn defaults() -> Arc<RoutingMetadata> {
        Arc::new(RoutingMetadata::new(
            "default-src".into(),
            "prod".into(),
            "node-1".into(),
            true,
        ))
    }

    fn container(name: &str, labels: &[(&str, &str)]) -> ContainerInfo {
        let mut info = ContainerInfo::new(name.to_string());
        info.labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        info
    }

    fn resolver_with(
        containers: impl ContainerLookup + 'static,
        pods: impl PodLookup + 'static,
    ) -> MetadataResolver {
        MetadataResolver::new(defaults(), Arc::new(containers), Arc::new(pods))
    }

    fn single(id: &str, info: ContainerInfo) -> FakeContainers {
        FakeContainers(HashMap::from([(id.to_string(), info)]))
    }

    fn container_entry(id: &str) -> Event {
        Event::new("c", 1)
            .with_field(fields::SYSTEMD_SLICE, "system.slice")
            .with_field(fields::CONTAINER_ID, &id[..4])
            .with_field(fields::CONTAINER_ID_FULL, id)
    }

    #[tokio::test]
    async fn test_raw_transport() {
        let resolver = resolver_with(FakeContainers(HashMap::new()), FakePods(None));
        let event = Event::new("c", 1).with_field(fields::TRANSPORT, "kernel");
        let md = resolver.resolve(&event).await;
        assert_eq!(md.category, "prod/journald/kernel");
        assert_eq!(md.source, "kernel");
        assert_eq!(md.host, "node-1");
        assert!(md.trusted_timestamp);
    }

    #[tokio::test]
    async fn test_systemd_service() {
        let resolver = resolver_with(FakeContainers(HashMap::new()), FakePods(None));
        let event = Event::new("c", 1)
            .with_field(fields::SYSTEMD_SLICE, "system.slice")
            .with_field(fields::SYSLOG_IDENTIFIER, "sshd");
        let md = resolver.resolve(&event).await;
        assert_eq!(md.category, "prod/systemd/sshd");
        assert_eq!(md.source, "sshd");
        assert!(md.trusted_timestamp);
    }

    #[tokio::test]
    async fn test_plain_docker_container() {
        let resolver = resolver_with(single("abcd1234", container("web", &[])), FakePods(None));
        let md = resolver.resolve(&container_entry("abcd1234")).await;
        assert_eq!(md.category, "prod/docker/web");
        assert_eq!(md.source, "web");
        assert!(!md.trusted_timestamp);
    }

    #[tokio::test]
    async fn test_docker_label_overrides() {
        let info = container(
            "web",
            &[
                (SUMO_CATEGORY_LABEL, "frontend"),
                (SUMO_SOURCE_LABEL, "web-src"),
                (TRUSTED_TIMESTAMP_LABEL, ""),
            ],
        );
        let resolver = resolver_with(single("abcd1234", info), FakePods(None));
        let md = resolver.resolve(&container_entry("abcd1234")).await;
        assert_eq!(md.category, "prod/docker/frontend");
        assert_eq!(md.source, "web-src");
        assert!(md.trusted_timestamp);
    }

    fn pod_container(extra: &[(&str, &str)]) -> ContainerInfo {
        let mut labels = vec![
            (KUBERNETES_POD_NAMESPACE_LABEL, "shop"),
            (KUBERNETES_POD_NAME_LABEL, "web-7d9f-xk2p"),
        ];
        labels.extend_from_slice(extra);
        container("k8s_web_web-7d9f-xk2p_shop_0", &labels)
    }

    #[tokio::test]
    async fn test_kubernetes_pod_with_owner() {
        let mut pod = PodInfo::new("web-7d9f-xk2p".into(), "shop".into());
        pod.owner = Some("web-7d9f".into());
        let resolver = resolver_with(single("abcd1234", pod_container(&[])), FakePods(Some(pod)));

        let md = resolver.resolve(&container_entry("abcd1234")).await;
        assert_eq!(md.category, "prod/kubernetes/shop/web-7d9f");
        assert_eq!(md.source, "shop.web-7d9f-xk2p");
        assert!(!md.trusted_timestamp);
    }

    #[tokio::test]
    async fn test_kubernetes_pod_lookup_failure_uses_pod_name() {
        let resolver = resolver_with(single("abcd1234", pod_container(&[])), BrokenPods);
        let md = resolver.resolve(&container_entry("abcd1234")).await;
        assert_eq!(md.category, "prod/kubernetes/shop/web-7d9f-xk2p");
        assert_eq!(md.source, "shop.web-7d9f-xk2p");
    }

    #[tokio::test]
    async fn test_kubernetes_overrides() {
        let info = pod_container(&[
            (KUBERNETES_CATEGORY_OVERRIDE_LABEL, "payments"),
            (KUBERNETES_SOURCE_OVERRIDE_LABEL, "checkout"),
        ]);
        let resolver = resolver_with(single("abcd1234", info), FakePods(None));
        let md = resolver.resolve(&container_entry("abcd1234")).await;
        assert_eq!(md.category, "prod/kubernetes/payments");
        assert_eq!(md.source, "shop.checkout");
    }

    #[tokio::test]
    async fn test_container_lookup_failure_uses_defaults() {
        let resolver = resolver_with(BrokenContainers, FakePods(None));
        let md = resolver.resolve(&container_entry("abcd1234")).await;
        assert_eq!(md, *defaults());
    }

    #[tokio::test]
    async fn test_vanished_container_uses_defaults() {
        let resolver = resolver_with(FakeContainers(HashMap::new()), FakePods(None));
        let md = resolver.resolve(&container_entry("abcd1234")).await;
        assert_eq!(md, *defaults());
    }
}
