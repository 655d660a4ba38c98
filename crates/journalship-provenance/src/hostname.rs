//! Host name detection: explicit override, cloud metadata, then the local host

use std::time::Duration;

use tracing::{info, warn};

pub const AWS_HOSTNAME_URL: &str = "http://169.254.169.254/latest/meta-data/hostname";
pub const GCP_HOSTNAME_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/hostname";

/// Where to look for the host name, in order
#[derive(Clone, Debug)]
pub struct HostnameSources {
    pub aws_url: String,
    pub gcp_url: String,
    pub timeout: Duration,
}

impl Default for HostnameSources {
    fn default() -> Self {
        Self {
            aws_url: AWS_HOSTNAME_URL.to_string(),
            gcp_url: GCP_HOSTNAME_URL.to_string(),
            timeout: Duration::from_secs(1),
        }
    }
}

/// Resolve the host name to report, never failing: falls back to "unknown"
pub async fn detect_hostname(override_host: Option<&str>, sources: &HostnameSources) -> String {
    if let Some(host) = override_host.filter(|h| !h.is_empty()) {
        return host.to_string();
    }

    let client = match reqwest::Client::builder().timeout(sources.timeout).build() {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Could not build metadata client: {}", e);
            None
        }
    };

    if let Some(client) = &client {
        match fetch(client.get(&sources.aws_url)).await {
            Ok(host) => return host,
            Err(e) => info!("Error getting AWS hostname: {}", e),
        }
        match fetch(client.get(&sources.gcp_url).header("Metadata-Flavor", "Google")).await {
            Ok(host) => return host,
            Err(e) => info!("Error getting GCP hostname: {}", e),
        }
    }

    local_hostname().unwrap_or_else(|| {
        warn!("Error getting hostname, using \"unknown\"");
        "unknown".to_string()
    })
}

async fn fetch(request: reqwest::RequestBuilder) -> Result<String, reqwest::Error> {
    let body = request.send().await?.error_for_status()?.text().await?;
    Ok(body.trim().to_string())
}

/// The kernel's host name; non-UTF-8 names are treated as missing
fn local_hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(name) => name
            .to_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
            None
        }
    }
}
