use thiserror::Error;

/// Failures talking to provenance services.
///
/// These never escape the resolver; they are logged and replaced by
/// fallback metadata.
#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("docker socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("docker request failed: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("invalid docker request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("docker responded with status {0}")]
    Status(u16),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("lookup timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, ProvenanceError>;
