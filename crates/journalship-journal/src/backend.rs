use std::time::Duration;

use async_trait::async_trait;

use journalship_types::Event;

use crate::error::Result;

/// Outcome of waiting on the journal for new data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitResult {
    /// Nothing changed before the timeout
    Nop,
    /// New entries were appended
    Append,
    /// Journal files were added or removed; the reader must reposition
    Invalidate,
}

/// Low-level access to the journal.
///
/// Mirrors the sd-journal cursor model: `next` advances, `entry` reads the
/// entry at the current position.
#[async_trait]
pub trait JournalBackend: Send {
    /// (Re)open the journal positioned just after `cursor`, or at the
    /// beginning when `cursor` is empty. Payload truncation must be disabled.
    async fn open(&mut self, cursor: &str) -> Result<()>;

    /// Advance one entry. Returns false at the end of the journal.
    async fn next(&mut self) -> Result<bool>;

    /// Block for up to `timeout` waiting for the journal to change
    async fn wait(&mut self, timeout: Duration) -> Result<WaitResult>;

    /// Read the entry at the current position
    async fn entry(&mut self) -> Result<Event>;
}
