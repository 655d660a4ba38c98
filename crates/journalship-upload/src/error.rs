use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    /// Gzip over an in-memory buffer failed. Not recoverable by retrying.
    #[error("failed to compress batch: {0}")]
    Compression(#[source] std::io::Error),

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector responded with status {0}")]
    Status(u16),
}

pub type Result<T> = std::result::Result<T, UploadError>;
