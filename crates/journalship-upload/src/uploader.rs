use std::time::{Duration, Instant};

use tracing::{info, warn};

use journalship_types::RoutingMetadata;

use crate::compress::compress_lines;
use crate::error::{Result, UploadError};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const BACKOFF_SECS: [u64; 8] = [0, 1, 2, 4, 8, 16, 32, 64];
const MAX_BACKOFF_SECS: u64 = 120;

/// Seconds to wait before attempt `n` (zero-based)
pub fn backoff(n: u32) -> u64 {
    BACKOFF_SECS
        .get(n as usize)
        .copied()
        .unwrap_or(MAX_BACKOFF_SECS)
}

/// Outcome of a delivered batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Attempts made, including the successful one
    pub attempts: u32,

    /// Size of the compressed payload
    pub compressed_bytes: usize,
}

impl UploadReport {
    pub fn failed_attempts(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Posts gzip batches to the collector, retrying until accepted
#[derive(Clone, Debug)]
pub struct Uploader {
    client: reqwest::Client,
    trusted_url: String,
    untrusted_url: String,

    /// Real time represented by one backoff second
    backoff_unit: Duration,
}

impl Uploader {
    pub fn new(
        trusted_url: impl Into<String>,
        untrusted_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(UploadError::Client)?;
        Ok(Self {
            client,
            trusted_url: trusted_url.into(),
            untrusted_url: untrusted_url.into(),
            backoff_unit: Duration::from_secs(1),
        })
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn url_for(&self, metadata: &RoutingMetadata) -> &str {
        if metadata.trusted_timestamp {
            &self.trusted_url
        } else {
            &self.untrusted_url
        }
    }

    /// Deliver `lines` under `metadata`. Only returns once the collector has
    /// accepted the batch; the sole error is a compression failure.
    pub async fn upload<S: AsRef<str>>(
        &self,
        metadata: &RoutingMetadata,
        lines: &[S],
    ) -> Result<UploadReport> {
        let payload = compress_lines(lines)?;
        let url = self.url_for(metadata);

        let mut attempt = 0u32;
        loop {
            let delay = backoff(attempt);
            if delay > 0 {
                info!("Backing off for {} seconds", delay);
                tokio::time::sleep(self.backoff_unit * delay as u32).await;
            }
            attempt = attempt.saturating_add(1);

            let start = Instant::now();
            match self.post(url, metadata, payload.clone()).await {
                Ok(()) => {
                    info!(
                        category = %metadata.category,
                        "Uploaded {} bytes in {:?}",
                        payload.len(),
                        start.elapsed()
                    );
                    return Ok(UploadReport {
                        attempts: attempt,
                        compressed_bytes: payload.len(),
                    });
                }
                Err(e) => warn!(category = %metadata.category, "Error uploading logs: {}", e),
            }
        }
    }

    async fn post(&self, url: &str, metadata: &RoutingMetadata, body: Vec<u8>) -> Result<()> {
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "text/plain")
            .header("Content-Encoding", "gzip")
            .header("X-Sumo-Name", &metadata.source)
            .header("X-Sumo-Host", &metadata.host)
            .header("X-Sumo-Category", &metadata.category)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        // Drain the body so a broken response counts as a failed attempt
        resp.bytes().await?;
        if status != reqwest::StatusCode::OK {
            return Err(UploadError::Status(status.as_u16()));
        }
        Ok(())
    }
}
