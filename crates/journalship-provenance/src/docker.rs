//! Container lookups against the Docker Engine API over its Unix socket

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::UnixStream;
use tracing::debug;

use journalship_types::ContainerInfo;

use crate::error::{ProvenanceError, Result};

pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Source of container names and labels
#[async_trait]
pub trait ContainerLookup: Send + Sync {
    /// Look up a container by full id. `Ok(None)` means it no longer exists.
    async fn container(&self, full_id: &str) -> Result<Option<ContainerInfo>>;
}

/// Entry of `GET /containers/json`
#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Names", default)]
    names: Vec<String>,

    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
}

/// Docker Engine API client speaking HTTP/1 over a Unix socket
#[derive(Clone, Debug)]
pub struct DockerClient {
    socket: PathBuf,
    timeout: Duration,
}

impl DockerClient {
    pub fn new(socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            timeout,
        }
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let stream = UnixStream::connect(&self.socket).await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("docker connection closed: {}", e);
            }
        });

        let req = Request::builder()
            .uri(path)
            .header(hyper::header::HOST, "docker")
            .body(Empty::<Bytes>::new())?;
        let resp = sender.send_request(req).await?;
        if resp.status() != StatusCode::OK {
            return Err(ProvenanceError::Status(resp.status().as_u16()));
        }
        Ok(resp.into_body().collect().await?.to_bytes())
    }

    async fn list_by_id(&self, full_id: &str) -> Result<Option<ContainerInfo>> {
        let filters = format!(r#"{{"id":["{}"]}}"#, full_id);
        let path = format!("/containers/json?filters={}", encode_query(&filters));
        let body = self.get(&path).await?;
        let containers: Vec<ContainerSummary> = serde_json::from_slice(&body)?;
        Ok(containers.into_iter().next().and_then(summary_to_info))
    }
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_SOCKET, Duration::from_secs(2))
    }
}

#[async_trait]
impl ContainerLookup for DockerClient {
    async fn container(&self, full_id: &str) -> Result<Option<ContainerInfo>> {
        tokio::time::timeout(self.timeout, self.list_by_id(full_id))
            .await
            .map_err(|_| ProvenanceError::Timeout(self.timeout))?
    }
}

/// The container may have died between logging and lookup, leaving no name
fn summary_to_info(summary: ContainerSummary) -> Option<ContainerInfo> {
    let name = summary.names.into_iter().next()?;
    let mut info = ContainerInfo::new(name.trim_start_matches('/').to_string());
    info.labels = summary.labels.unwrap_or_default();
    Some(info)
}

/// Percent-encode a query parameter value
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
