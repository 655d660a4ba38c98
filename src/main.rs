use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use journalship::config::{Args, Config, PodSource};
use journalship::forwarder::{Forwarder, admission_chain, format_chain};
use journalship::signals;
use journalship_journal::{JournalReader, JournalctlBackend};
use journalship_logs::{BufferStore, SeenCursors};
use journalship_provenance::{
    ApiServerPodLookup, DockerClient, HostnameSources, KubeletClient, MetadataResolver, PodLookup,
    detect_hostname,
};
use journalship_types::RoutingMetadata;
use journalship_upload::Uploader;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = Config::load(args);

    let directive = config.as_ref().ok().and_then(|c| c.log_level.clone());
    init_tracing(directive.as_deref());

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e).context("invalid configuration"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr. An explicit directive wins over `RUST_LOG`.
fn init_tracing(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    signals::listen(shutdown.clone()).context("failed to install signal handlers")?;

    let host = detect_hostname(config.source_host.as_deref(), &HostnameSources::default()).await;
    let defaults = Arc::new(RoutingMetadata::new(
        config.source_name.clone(),
        config.source_category.clone(),
        host,
        true,
    ));
    info!(
        source = %defaults.source,
        category = %defaults.category,
        host = %defaults.host,
        "Metadata defaults"
    );

    let containers = Arc::new(DockerClient::new(
        config.docker_socket.clone(),
        config.docker_timeout,
    ));
    let pods: Arc<dyn PodLookup> = match &config.pod_source {
        PodSource::Kubelet { url } => Arc::new(
            KubeletClient::new(url.clone(), config.kubelet_timeout)
                .context("failed to build kubelet client")?,
        ),
        PodSource::ApiServer { node_name } => Arc::new(
            ApiServerPodLookup::connect(node_name.clone(), config.kubelet_timeout)
                .await
                .context("failed to connect to the Kubernetes API server")?,
        ),
    };
    let resolver = MetadataResolver::new(defaults, containers, pods);

    let uploader = Uploader::new(
        config.trusted_url.clone(),
        config.untrusted_url.clone(),
        config.request_timeout,
    )
    .context("failed to build uploader")?;

    let reader = JournalReader::open(
        JournalctlBackend::default(),
        &config.statefile,
        config.checkpoint_mode,
    )
    .await
    .context("could not open journal")?;

    let mut forwarder = Forwarder::new(reader, resolver, uploader, shutdown)
        .with_admission(admission_chain(
            &config.include_transports,
            &config.exclude_transports,
            &config.exclude_units,
        ))
        .with_format(format_chain(&config.format_exclude_units))
        .with_excluded_categories(config.exclude_categories.clone())
        .with_buffers(BufferStore::new(config.buffer_expiry, config.flush))
        .with_seen_cursors(SeenCursors::new(config.seen_cursor_expiry));

    forwarder.run().await?;
    Ok(())
}
