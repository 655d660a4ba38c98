use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading the journal
#[derive(Debug, Error)]
pub enum JournalError {
    /// The journal could not report an entry's realtime timestamp.
    /// Seen intermittently in the wild; cured by reopening the journal.
    #[error("failed to get realtime timestamp: {0}")]
    Timestamp(String),

    #[error("failed to start journal reader: {0}")]
    Spawn(#[source] std::io::Error),

    /// journalctl quit with a failure status, e.g. it could not seek to the cursor
    #[error("journalctl exited with {0}")]
    Exited(std::process::ExitStatus),

    #[error("journal read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed journal entry: {0}")]
    Decode(String),

    #[error("no journal entry is positioned for reading")]
    NoEntry,

    #[error("checkpoint file {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl JournalError {
    /// Transient faults are recovered by reopening the journal
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timestamp(_))
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;
