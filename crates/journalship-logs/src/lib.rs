//! Log processing for journalship
//!
//! This crate provides entry filtering and the per-source buffers that
//! batch lines between journal reads and uploads.

mod buffer;
mod expiring;
mod filter;
mod store;

pub use buffer::{FlushPolicy, LogBuffer, MAX_BUFFER_AGE, MAX_BUFFER_BYTES};
pub use expiring::ExpiringMap;
pub use filter::{FilterChain, FilterFn, allowed_transports, by_transport, exclude_units};
pub use store::{
    ACTIVE_BUFFER_EXPIRY, BufferStore, SEEN_CURSOR_EXPIRY, SeenCursors, SharedBuffer, key_for,
};

// Re-export types used in our public API
pub use journalship_types::{Event, RoutingMetadata};
