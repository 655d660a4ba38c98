//! Journal reading for journalship
//!
//! This crate provides a cursor-tracked reader over the systemd journal
//! with crash-resumable checkpointing.

mod backend;
mod checkpoint;
mod error;
mod journalctl;
pub mod memory;
mod reader;

pub use backend::{JournalBackend, WaitResult};
pub use checkpoint::{read_checkpoint, write_checkpoint};
pub use error::{JournalError, Result};
pub use journalctl::{JournalctlBackend, parse_entry};
pub use reader::{CheckpointMode, JOURNAL_WAIT_TIME, JournalReader};

// Re-export types used in our public API
pub use journalship_types::Event;
