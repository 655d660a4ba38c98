//! The main read, buffer and flush loop

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use journalship_journal::{CheckpointMode, Event, JournalBackend, JournalError, JournalReader};
use journalship_logs::{
    BufferStore, FilterChain, SeenCursors, SharedBuffer, allowed_transports, by_transport,
    exclude_units, key_for,
};
use journalship_provenance::MetadataResolver;
use journalship_upload::{UploadError, UploadReport, Uploader};

#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("flush worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// Diagnostic counters, shared with flush workers
#[derive(Debug, Default)]
pub struct ForwarderStats {
    duplicate_cursor: AtomicU64,
    reappended_cursor: AtomicU64,
    uploads: AtomicU64,
    upload_failures: AtomicU64,
    uploaded_bytes: AtomicU64,
}

/// Point-in-time copy of [`ForwarderStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub duplicate_cursor: u64,
    pub reappended_cursor: u64,
    pub uploads: u64,
    pub upload_failures: u64,
    pub uploaded_bytes: u64,
}

impl ForwarderStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            duplicate_cursor: self.duplicate_cursor.load(Ordering::Relaxed),
            reappended_cursor: self.reappended_cursor.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            upload_failures: self.upload_failures.load(Ordering::Relaxed),
            uploaded_bytes: self.uploaded_bytes.load(Ordering::Relaxed),
        }
    }

    fn record_upload(&self, report: &UploadReport) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.upload_failures
            .fetch_add(u64::from(report.failed_attempts()), Ordering::Relaxed);
        self.uploaded_bytes
            .fetch_add(report.compressed_bytes as u64, Ordering::Relaxed);
    }
}

/// Admission chain: allowed transports, then excluded systemd units
pub fn admission_chain(
    include_transports: &[String],
    exclude_transports: &[String],
    excluded_units: &[String],
) -> FilterChain {
    let transports = allowed_transports(include_transports, exclude_transports);
    info!("Listening for journald transports: {:?}", transports);
    let mut chain = FilterChain::new().with_filter(by_transport(transports));

    if !excluded_units.is_empty() {
        info!("Excluding systemd units named: {:?}", excluded_units);
        chain.add_filter(exclude_units(excluded_units.to_vec()));
    }
    chain
}

/// Entries accepted by this chain are sent formatted rather than raw
pub fn format_chain(unformatted_units: &[String]) -> FilterChain {
    info!("Not formatting message for systemd units: {:?}", unformatted_units);
    FilterChain::new().with_filter(exclude_units(unformatted_units.to_vec()))
}

/// True if `category` contains any of the excluded substrings
pub fn is_category_excluded<S: AsRef<str>>(category: &str, excluded: &[S]) -> bool {
    excluded.iter().any(|ex| category.contains(ex.as_ref()))
}

/// Reads the journal, routes entries into buffers and flushes them
pub struct Forwarder<B: JournalBackend> {
    reader: JournalReader<B>,
    admission: FilterChain,
    format: FilterChain,
    excluded_categories: Vec<String>,
    buffers: BufferStore,
    seen: SeenCursors,
    resolver: MetadataResolver,
    uploader: Arc<Uploader>,
    shutdown: CancellationToken,
    stats: Arc<ForwarderStats>,

    /// Cursor of the previous entry, to skip repeats
    last_cursor: String,
}

impl<B: JournalBackend> Forwarder<B> {
    pub fn new(
        reader: JournalReader<B>,
        resolver: MetadataResolver,
        uploader: Uploader,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reader,
            admission: FilterChain::new(),
            format: FilterChain::new(),
            excluded_categories: Vec::new(),
            buffers: BufferStore::default(),
            seen: SeenCursors::default(),
            resolver,
            uploader: Arc::new(uploader),
            shutdown,
            stats: Arc::new(ForwarderStats::default()),
            last_cursor: String::new(),
        }
    }

    pub fn with_admission(mut self, chain: FilterChain) -> Self {
        self.admission = chain;
        self
    }

    pub fn with_format(mut self, chain: FilterChain) -> Self {
        self.format = chain;
        self
    }

    pub fn with_excluded_categories(mut self, excluded: Vec<String>) -> Self {
        if !excluded.is_empty() {
            info!("Excluding messages for sumo source categories: {:?}", excluded);
        }
        self.excluded_categories = excluded;
        self
    }

    pub fn with_buffers(mut self, buffers: BufferStore) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn with_seen_cursors(mut self, seen: SeenCursors) -> Self {
        self.seen = seen;
        self
    }

    pub fn stats(&self) -> Arc<ForwarderStats> {
        Arc::clone(&self.stats)
    }

    pub fn buffers(&self) -> &BufferStore {
        &self.buffers
    }

    pub fn reader(&self) -> &JournalReader<B> {
        &self.reader
    }

    /// Run until shutdown is requested or a fatal error occurs.
    ///
    /// Shutdown does not flush buffers or write an extra checkpoint.
    pub async fn run(&mut self) -> Result<(), ForwarderError> {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let entry = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                entry = self.reader.next_entry() => entry?,
            };
            if let Some(event) = entry {
                self.ingest(event).await;
            }

            if !self.flush().await? {
                break;
            }

            if self.reader.mode() == CheckpointMode::PerIteration {
                self.reader.persist()?;
            }
        }

        info!("Caught signal, shutting down.");
        let stats = self.stats.snapshot();
        info!(
            duplicate_cursor = stats.duplicate_cursor,
            reappended_cursor = stats.reappended_cursor,
            uploads = stats.uploads,
            upload_failures = stats.upload_failures,
            uploaded_bytes = stats.uploaded_bytes,
            "Final counters"
        );
        Ok(())
    }

    /// Route one entry into its buffer
    pub async fn ingest(&mut self, event: Event) {
        if event.cursor == self.last_cursor {
            debug!(cursor = %event.cursor, "Skipping repeated cursor");
            self.stats.duplicate_cursor.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if self.admission.want(&event) {
            let line = if self.format.want(&event) {
                event.formatted()
            } else {
                event.message().to_string()
            };

            let key = key_for(&event);
            let resolver = &self.resolver;
            let buffer = self
                .buffers
                .get_or_create(&key, || resolver.resolve(&event))
                .await;

            let appended = {
                let mut buffer = buffer.lock();
                if is_category_excluded(&buffer.metadata().category, &self.excluded_categories) {
                    false
                } else {
                    buffer.append(line);
                    true
                }
            };

            if appended && !self.seen.record(&event.cursor) {
                warn!("Processing previously seen cursor: {}", event.cursor);
                self.stats.reappended_cursor.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.last_cursor = event.cursor;
    }

    /// Upload every buffer that needs it. Returns false if shutdown was
    /// requested before all workers finished; unfinished workers are dropped.
    async fn flush(&self) -> Result<bool, ForwarderError> {
        let mut workers = JoinSet::new();
        for (_, buffer) in self.buffers.snapshot() {
            workers.spawn(flush_buffer(
                buffer,
                Arc::clone(&self.uploader),
                Arc::clone(&self.stats),
            ));
        }

        let mut flushed = 0usize;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(false),
                joined = workers.join_next() => match joined {
                    Some(result) => {
                        if result?? {
                            flushed += 1;
                        }
                    }
                    None => break,
                },
            }
        }

        if flushed > 0 {
            let stats = self.stats.snapshot();
            debug!(
                flushed,
                buffers = self.buffers.len(),
                uploads = stats.uploads,
                upload_failures = stats.upload_failures,
                uploaded_bytes = stats.uploaded_bytes,
                duplicate_cursor = stats.duplicate_cursor,
                reappended_cursor = stats.reappended_cursor,
                "Flushed buffers"
            );
        }
        Ok(true)
    }
}

/// Upload and clear one buffer if its flush policy says so
async fn flush_buffer(
    buffer: SharedBuffer,
    uploader: Arc<Uploader>,
    stats: Arc<ForwarderStats>,
) -> Result<bool, UploadError> {
    let (metadata, lines) = {
        let buffer = buffer.lock();
        if !buffer.needs_flush() {
            return Ok(false);
        }
        (buffer.metadata().clone(), buffer.messages().to_vec())
    };

    let report = uploader.upload(&metadata, &lines).await?;
    stats.record_upload(&report);
    buffer.lock().clear();
    Ok(true)
}
