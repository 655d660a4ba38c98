//! Batch uploads for journalship
//!
//! Batches are newline-joined, gzipped and posted to the trusted or
//! untrusted timestamp collector endpoint, retrying with backoff until
//! the collector accepts them.

mod compress;
mod error;
mod uploader;

pub use compress::compress_lines;
pub use error::{Result, UploadError};
pub use uploader::{DEFAULT_REQUEST_TIMEOUT, UploadReport, Uploader, backoff};

// Re-export types used in our public API
pub use journalship_types::RoutingMetadata;
