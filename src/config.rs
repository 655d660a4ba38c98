//! Command line, environment and config file handling

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use journalship_journal::CheckpointMode;
use journalship_logs::{
    ACTIVE_BUFFER_EXPIRY, FlushPolicy, MAX_BUFFER_AGE, MAX_BUFFER_BYTES, SEEN_CURSOR_EXPIRY,
};
use journalship_provenance::{DEFAULT_DOCKER_SOCKET, DEFAULT_KUBELET_PODS_URL};
use journalship_types::{VALID_TRANSPORTS, split};
use journalship_upload::DEFAULT_REQUEST_TIMEOUT;

pub const DEFAULT_STATE_FILE: &str = "log-forwarder.state";
pub const DEFAULT_FORMAT_EXCLUDE_UNITS: &str = "docker.service";
const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("unknown journal transport '{0}' (expected one of: {list})", list = VALID_TRANSPORTS.join(", "))]
    UnknownTransport(String),

    #[error("invalid checkpoint mode: {0}")]
    CheckpointMode(String),
}

/// journalship - ships systemd journal entries to a Sumo Logic HTTP collector
#[derive(Parser, Debug, Default)]
#[command(name = "journalship")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Collector URL used for whichever of the trusted/untrusted URLs is unset
    #[arg(long, env = "SUMO_COLLECTOR_URL")]
    pub collector_url: Option<String>,

    /// Collector URL for batches with trusted timestamps
    #[arg(long, env = "SUMO_TRUSTED_TIMESTAMP_COLLECTOR_URL")]
    pub trusted_url: Option<String>,

    /// Collector URL for batches with untrusted timestamps
    #[arg(long, env = "SUMO_UNTRUSTED_TIMESTAMP_COLLECTOR_URL")]
    pub untrusted_url: Option<String>,

    /// Default source name
    #[arg(long, env = "SUMO_SOURCE_NAME")]
    pub source_name: Option<String>,

    /// Default source category, prefixed to every derived category
    #[arg(long, env = "SUMO_SOURCE_CATEGORY")]
    pub source_category: Option<String>,

    /// Host name to report instead of detecting one
    #[arg(long, env = "SUMO_SOURCE_HOST")]
    pub source_host: Option<String>,

    /// Comma separated; entries whose category contains any of these are dropped
    #[arg(long = "exclude-categories", env = "SUMO_EXCLUDE_SOURCE_CATEGORIES")]
    pub exclude_categories: Option<String>,

    /// Comma separated journal transports to read (default: all)
    #[arg(long, env = "JOURNAL_INCLUDE_TRANSPORTS")]
    pub include_transports: Option<String>,

    /// Comma separated journal transports to skip
    #[arg(long, env = "JOURNAL_EXCLUDE_TRANSPORTS")]
    pub exclude_transports: Option<String>,

    /// Comma separated systemd units to skip
    #[arg(long, env = "JOURNAL_EXCLUDE_UNITS")]
    pub exclude_units: Option<String>,

    /// Comma separated systemd units whose messages are sent unformatted
    #[arg(long, env = "FORMAT_MESSAGE_EXCLUDE_UNITS")]
    pub format_exclude_units: Option<String>,

    /// File holding the last processed journal cursor
    #[arg(long, env = "JOURNALSHIP_STATE_FILE")]
    pub statefile: Option<PathBuf>,

    /// When to write the checkpoint: per-entry or per-iteration
    #[arg(long)]
    pub checkpoint_mode: Option<CheckpointMode>,

    /// Log filter directive, e.g. "info" or "journalship=debug"
    #[arg(long)]
    pub log_level: Option<String>,

    /// Optional TOML config file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

/// On-disk configuration. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub sumo: SumoSection,
    pub journal: JournalSection,
    pub flush: FlushSection,
    pub buffers: BuffersSection,
    pub upload: UploadSection,
    pub docker: DockerSection,
    pub kubelet: KubeletSection,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SumoSection {
    pub collector_url: Option<String>,
    pub trusted_url: Option<String>,
    pub untrusted_url: Option<String>,
    pub source_name: Option<String>,
    pub source_category: Option<String>,
    pub source_host: Option<String>,
    pub exclude_categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JournalSection {
    pub include_transports: Option<Vec<String>>,
    pub exclude_transports: Option<Vec<String>>,
    pub exclude_units: Option<Vec<String>>,
    pub format_exclude_units: Option<Vec<String>>,
    pub statefile: Option<PathBuf>,
    pub checkpoint_mode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlushSection {
    pub max_bytes: Option<usize>,
    pub max_age_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuffersSection {
    pub expiry_secs: Option<u64>,
    pub seen_cursor_expiry_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadSection {
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DockerSection {
    pub socket: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KubeletSection {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,

    /// List pods through the API server instead of the kubelet
    pub use_api_server: bool,

    /// Node to restrict API server listings to
    pub node_name: Option<String>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Where pod ownership is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodSource {
    Kubelet { url: String },
    ApiServer { node_name: Option<String> },
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Config {
    pub trusted_url: String,
    pub untrusted_url: String,
    pub source_name: String,
    pub source_category: String,
    pub source_host: Option<String>,
    pub exclude_categories: Vec<String>,

    pub include_transports: Vec<String>,
    pub exclude_transports: Vec<String>,
    pub exclude_units: Vec<String>,
    pub format_exclude_units: Vec<String>,

    pub statefile: PathBuf,
    pub checkpoint_mode: CheckpointMode,

    pub flush: FlushPolicy,
    pub buffer_expiry: Duration,
    pub seen_cursor_expiry: Duration,
    pub request_timeout: Duration,

    pub docker_socket: PathBuf,
    pub docker_timeout: Duration,
    pub pod_source: PodSource,
    pub kubelet_timeout: Duration,

    pub log_level: Option<String>,
}

impl Config {
    /// Load the file named by `--config` (if any) and merge it under `args`
    pub fn load(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    /// Flags and environment win over the file, the file over defaults
    pub fn merge(args: Args, file: FileConfig) -> Result<Self, ConfigError> {
        let collector_url = args.collector_url.or(file.sumo.collector_url);
        let trusted_url = args
            .trusted_url
            .or(file.sumo.trusted_url)
            .or_else(|| collector_url.clone())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("SUMO_TRUSTED_TIMESTAMP_COLLECTOR_URL"))?;
        let untrusted_url = args
            .untrusted_url
            .or(file.sumo.untrusted_url)
            .or(collector_url)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("SUMO_UNTRUSTED_TIMESTAMP_COLLECTOR_URL"))?;

        let source_name = args
            .source_name
            .or(file.sumo.source_name)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("SUMO_SOURCE_NAME"))?;
        let source_category = args
            .source_category
            .or(file.sumo.source_category)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("SUMO_SOURCE_CATEGORY"))?;

        let include_transports = list(args.include_transports, file.journal.include_transports);
        let exclude_transports = list(args.exclude_transports, file.journal.exclude_transports);
        for name in include_transports.iter().chain(&exclude_transports) {
            if !VALID_TRANSPORTS.contains(&name.as_str()) {
                return Err(ConfigError::UnknownTransport(name.clone()));
            }
        }

        let mut format_exclude_units =
            list(args.format_exclude_units, file.journal.format_exclude_units);
        if format_exclude_units.is_empty() {
            format_exclude_units = vec![DEFAULT_FORMAT_EXCLUDE_UNITS.to_string()];
        }

        let checkpoint_mode = match args.checkpoint_mode {
            Some(mode) => mode,
            None => match file.journal.checkpoint_mode {
                Some(s) => s.parse().map_err(ConfigError::CheckpointMode)?,
                None => CheckpointMode::default(),
            },
        };

        let flush = FlushPolicy {
            max_bytes: file.flush.max_bytes.unwrap_or(MAX_BUFFER_BYTES),
            max_age: secs_or(file.flush.max_age_secs, MAX_BUFFER_AGE),
        };

        let pod_source = if file.kubelet.use_api_server {
            PodSource::ApiServer {
                node_name: file.kubelet.node_name,
            }
        } else {
            PodSource::Kubelet {
                url: file
                    .kubelet
                    .url
                    .unwrap_or_else(|| DEFAULT_KUBELET_PODS_URL.to_string()),
            }
        };

        Ok(Self {
            trusted_url,
            untrusted_url,
            source_name,
            source_category,
            source_host: args
                .source_host
                .or(file.sumo.source_host)
                .filter(|s| !s.is_empty()),
            exclude_categories: list(args.exclude_categories, file.sumo.exclude_categories),
            include_transports,
            exclude_transports,
            exclude_units: list(args.exclude_units, file.journal.exclude_units),
            format_exclude_units,
            statefile: args
                .statefile
                .or(file.journal.statefile)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            checkpoint_mode,
            flush,
            buffer_expiry: secs_or(file.buffers.expiry_secs, ACTIVE_BUFFER_EXPIRY),
            seen_cursor_expiry: secs_or(file.buffers.seen_cursor_expiry_secs, SEEN_CURSOR_EXPIRY),
            request_timeout: secs_or(file.upload.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT),
            docker_socket: file
                .docker
                .socket
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKER_SOCKET)),
            docker_timeout: secs_or(file.docker.timeout_secs, DEFAULT_LOOKUP_TIMEOUT),
            pod_source,
            kubelet_timeout: secs_or(file.kubelet.timeout_secs, DEFAULT_LOOKUP_TIMEOUT),
            log_level: args.log_level.or(file.log_level),
        })
    }
}

/// A comma separated flag value, falling back to the file's list
fn list(flag: Option<String>, file: Option<Vec<String>>) -> Vec<String> {
    match flag {
        Some(s) => split(&s, ","),
        None => file.unwrap_or_default(),
    }
}

fn secs_or(secs: Option<u64>, default: Duration) -> Duration {
    secs.map(Duration::from_secs).unwrap_or(default)
}
