//! Provenance lookups for journalship
//!
//! Resolves where a journal entry came from (raw transport, systemd
//! service, Docker container or Kubernetes pod) into the routing
//! metadata its batch is uploaded with.

mod docker;
mod error;
mod hostname;
mod kubelet;
mod resolver;

pub use docker::{ContainerLookup, DEFAULT_DOCKER_SOCKET, DockerClient};
pub use error::{ProvenanceError, Result};
pub use hostname::{AWS_HOSTNAME_URL, GCP_HOSTNAME_URL, HostnameSources, detect_hostname};
pub use kubelet::{
    ApiServerPodLookup, DEFAULT_KUBELET_PODS_URL, KubeletClient, PodLookup, find_pod_for_container,
};
pub use resolver::{
    KUBERNETES_CATEGORY_OVERRIDE_LABEL, KUBERNETES_POD_NAME_LABEL, KUBERNETES_POD_NAMESPACE_LABEL,
    KUBERNETES_SOURCE_OVERRIDE_LABEL, MetadataResolver, SUMO_CATEGORY_LABEL, SUMO_SOURCE_LABEL,
    TRUSTED_TIMESTAMP_LABEL,
};

// Re-export types used in our public API
pub use journalship_types::{ContainerInfo, PodInfo, RoutingMetadata};
