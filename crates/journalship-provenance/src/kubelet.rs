//! Pod lookups, either from the node-local kubelet or the API server

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::ListParams;

use journalship_types::PodInfo;

use crate::error::{ProvenanceError, Result};

/// Kubelet read-only endpoint listing the pods on this node
pub const DEFAULT_KUBELET_PODS_URL: &str = "http://127.0.0.1:10255/pods";

/// Source of pod ownership details
#[async_trait]
pub trait PodLookup: Send + Sync {
    /// Find the pod running the container with this full id
    async fn pod_for_container(&self, container_id: &str) -> Result<Option<PodInfo>>;
}

/// Lists pods from the kubelet's read-only port
#[derive(Clone, Debug)]
pub struct KubeletClient {
    client: reqwest::Client,
    url: String,
}

impl KubeletClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn pods(&self) -> Result<Vec<Pod>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let list: k8s_openapi::List<Pod> = serde_json::from_slice(&body)?;
        Ok(list.items)
    }
}

#[async_trait]
impl PodLookup for KubeletClient {
    async fn pod_for_container(&self, container_id: &str) -> Result<Option<PodInfo>> {
        Ok(find_pod_for_container(self.pods().await?, container_id))
    }
}

/// Lists this node's pods through the Kubernetes API server
#[derive(Clone)]
pub struct ApiServerPodLookup {
    client: kube::Client,

    /// Restrict the listing to pods scheduled on this node
    node_name: Option<String>,

    timeout: Duration,
}

impl ApiServerPodLookup {
    /// Connect using in-cluster config or the local kubeconfig
    pub async fn connect(node_name: Option<String>, timeout: Duration) -> Result<Self> {
        let client = kube::Client::try_default().await?;
        Ok(Self {
            client,
            node_name,
            timeout,
        })
    }

    async fn pods(&self) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let mut params = ListParams::default();
        if let Some(node) = &self.node_name {
            params = params.fields(&format!("spec.nodeName={}", node));
        }
        let list = tokio::time::timeout(self.timeout, pods.list(&params))
            .await
            .map_err(|_| ProvenanceError::Timeout(self.timeout))??;
        Ok(list.items)
    }
}

#[async_trait]
impl PodLookup for ApiServerPodLookup {
    async fn pod_for_container(&self, container_id: &str) -> Result<Option<PodInfo>> {
        Ok(find_pod_for_container(self.pods().await?, container_id))
    }
}

/// Find the owned pod with a container whose runtime id contains
/// `container_id` (statuses report ids as `docker://<id>`)
pub fn find_pod_for_container(pods: Vec<Pod>, container_id: &str) -> Option<PodInfo> {
    pods.into_iter().find_map(|pod| {
        let owners = pod.metadata.owner_references.as_deref().unwrap_or_default();
        if owners.is_empty() {
            return None;
        }

        let runs_container = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref())
            .is_some_and(|statuses| {
                statuses.iter().any(|cs| {
                    cs.container_id
                        .as_deref()
                        .is_some_and(|id| id.contains(container_id))
                })
            });
        if !runs_container {
            return None;
        }

        let mut info = PodInfo::new(
            pod.metadata.name.clone().unwrap_or_default(),
            pod.metadata.namespace.clone().unwrap_or_default(),
        );
        info.owner = owners.first().map(|o| o.name.clone());
        Some(info)
    })
}
