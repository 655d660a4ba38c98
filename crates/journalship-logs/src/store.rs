use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use journalship_types::{Event, RoutingMetadata};

use crate::buffer::{FlushPolicy, LogBuffer};
use crate::expiring::ExpiringMap;

/// Buffers idle for this long are dropped
pub const ACTIVE_BUFFER_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// How long a delivered cursor is remembered for duplicate diagnostics
pub const SEEN_CURSOR_EXPIRY: Duration = Duration::from_secs(10 * 60);

/// A buffer shared between the control loop and a flush worker
pub type SharedBuffer = Arc<Mutex<LogBuffer>>;

/// Key selecting the buffer (and therefore the routing metadata) for an entry.
///
/// Containers are keyed by container id, other systemd services by syslog
/// identifier, and everything else by journal transport.
pub fn key_for(event: &Event) -> String {
    if event.is_service_managed() {
        if !event.container_id().is_empty() {
            format!("docker-{}", event.container_id())
        } else {
            format!("systemd-{}", event.syslog_identifier())
        }
    } else {
        format!("journald-{}", event.transport())
    }
}

/// Expiring map of active log buffers
pub struct BufferStore {
    buffers: ExpiringMap<SharedBuffer>,
    policy: FlushPolicy,
}

impl BufferStore {
    pub fn new(expiry: Duration, policy: FlushPolicy) -> Self {
        Self {
            buffers: ExpiringMap::new(expiry),
            policy,
        }
    }

    /// Return the buffer for `key`, creating it with metadata from `resolve`
    /// on a miss. `resolve` runs at most once per created buffer; an existing
    /// buffer keeps the metadata it was created with.
    pub async fn get_or_create<F, Fut>(&self, key: &str, resolve: F) -> SharedBuffer
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RoutingMetadata>,
    {
        if let Some(buffer) = self.buffers.get_and_touch(key) {
            return buffer;
        }

        let metadata = resolve().await;
        debug!(key, category = %metadata.category, "Creating log buffer");
        let buffer = Arc::new(Mutex::new(LogBuffer::with_policy(metadata, self.policy)));
        self.buffers.get_or_insert(key, buffer)
    }

    /// All live buffers, after dropping expired ones
    pub fn snapshot(&self) -> Vec<(String, SharedBuffer)> {
        self.buffers.items()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }
}

impl Default for BufferStore {
    fn default() -> Self {
        Self::new(ACTIVE_BUFFER_EXPIRY, FlushPolicy::default())
    }
}

/// Recently delivered cursors, used only to report reprocessing
pub struct SeenCursors {
    cursors: ExpiringMap<()>,
}

impl SeenCursors {
    pub fn new(expiry: Duration) -> Self {
        Self {
            cursors: ExpiringMap::new(expiry),
        }
    }

    /// Record a cursor. Returns false if it was already seen recently.
    pub fn record(&self, cursor: &str) -> bool {
        self.cursors.insert_if_absent(cursor, ())
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

impl Default for SeenCursors {
    fn default() -> Self {
        Self::new(SEEN_CURSOR_EXPIRY)
    }
}
