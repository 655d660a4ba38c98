use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info, warn};

use journalship_types::Event;

use crate::backend::{JournalBackend, WaitResult};
use crate::checkpoint::{read_checkpoint, write_checkpoint};
use crate::error::Result;

/// Block for up to this long waiting for a journal entry
pub const JOURNAL_WAIT_TIME: Duration = Duration::from_secs(2);

/// When the checkpoint cursor is written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CheckpointMode {
    /// After every retrieved entry, before it is buffered.
    /// A crash loses entries that were buffered but not yet uploaded.
    #[default]
    PerEntry,

    /// Once per main-loop iteration, after buffering and flushing
    PerIteration,
}

impl FromStr for CheckpointMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "per-entry" => Ok(Self::PerEntry),
            "per-iteration" => Ok(Self::PerIteration),
            other => Err(format!(
                "unknown checkpoint mode '{}' (expected per-entry or per-iteration)",
                other
            )),
        }
    }
}

/// Sequential, cursor-tracked reader over a journal backend
pub struct JournalReader<B: JournalBackend> {
    backend: B,

    /// Where the cursor is persisted
    state_file: PathBuf,

    /// Cursor of the last retrieved entry
    cursor: String,

    mode: CheckpointMode,

    wait_time: Duration,
}

impl<B: JournalBackend> JournalReader<B> {
    /// Load the checkpoint and open the backend positioned after it
    pub async fn open(backend: B, state_file: impl AsRef<Path>, mode: CheckpointMode) -> Result<Self> {
        let state_file = state_file.as_ref().to_path_buf();
        let cursor = read_checkpoint(&state_file)?;

        let mut reader = Self {
            backend,
            state_file,
            cursor,
            mode,
            wait_time: JOURNAL_WAIT_TIME,
        };
        reader.reopen().await?;
        Ok(reader)
    }

    /// Override how long `next_entry` blocks when the journal is idle
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    async fn reopen(&mut self) -> Result<()> {
        if self.cursor.is_empty() {
            info!("No last cursor, starting from beginning");
        } else {
            info!("Seeking to: {}", self.cursor);
        }
        self.backend.open(&self.cursor).await
    }

    /// Fetch the next entry, waiting briefly if none is available.
    ///
    /// `Ok(None)` means "nothing this time" and is not an error. Errors
    /// returned here are fatal.
    pub async fn next_entry(&mut self) -> Result<Option<Event>> {
        if !self.backend.next().await? {
            match self.backend.wait(self.wait_time).await? {
                WaitResult::Append => {}
                WaitResult::Invalidate => {
                    debug!("Journal invalidated, repositioning");
                    return Ok(None);
                }
                WaitResult::Nop => return Ok(None),
            }
        }

        let event = match self.backend.entry().await {
            Ok(event) => event,
            Err(e) if e.is_transient() => {
                warn!("GetEntry: {}", e);
                self.reopen().await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.cursor = event.cursor.clone();
        if self.mode == CheckpointMode::PerEntry {
            self.persist()?;
        }
        Ok(Some(event))
    }

    /// Write the current cursor to the state file
    pub fn persist(&self) -> Result<()> {
        write_checkpoint(&self.state_file, &self.cursor)
    }

    /// Cursor of the last retrieved entry
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    pub fn mode(&self) -> CheckpointMode {
        self.mode
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JournalError;
    use crate::memory;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    fn event(cursor: &str) -> Event {
        Event::new(cursor, 1).with_field("MESSAGE", "hello")
    }

    #[tokio::test]
    async fn test_open_seeks_to_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("fwd.state");
        std::fs::write(&state, "s=42").unwrap();

        let (_tx, backend) = memory::channel();
        let reader = JournalReader::open(backend, &state, CheckpointMode::PerEntry)
            .await
            .unwrap();
        assert_eq!(reader.cursor(), "s=42");
        assert_eq!(reader.backend().opened_at(), ["s=42".to_string()]);
    }

    #[tokio::test]
    async fn test_entry_checkpointed_before_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("fwd.state");

        let (tx, backend) = memory::channel();
        let mut reader = JournalReader::open(backend, &state, CheckpointMode::PerEntry)
            .await
            .unwrap()
            .with_wait_time(Duration::from_millis(10));

        tx.send(event("c1")).unwrap();
        let got = reader.next_entry().await.unwrap().unwrap();
        assert_eq!(got.cursor, "c1");
        assert_eq!(std::fs::read_to_string(&state).unwrap(), "c1");
    }

    #[tokio::test]
    async fn test_idle_journal_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, backend) = memory::channel();
        let mut reader =
            JournalReader::open(backend, dir.path().join("s"), CheckpointMode::PerEntry)
                .await
                .unwrap()
                .with_wait_time(Duration::from_millis(10));

        assert!(reader.next_entry().await.unwrap().is_none());
        assert!(!dir.path().join("s").exists());
    }

    #[tokio::test]
    async fn test_per_iteration_mode_defers_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("fwd.state");

        let (tx, backend) = memory::channel();
        let mut reader = JournalReader::open(backend, &state, CheckpointMode::PerIteration)
            .await
            .unwrap();

        tx.send(event("c7")).unwrap();
        reader.next_entry().await.unwrap().unwrap();
        assert!(!state.exists());

        reader.persist().unwrap();
        assert_eq!(std::fs::read_to_string(&state).unwrap(), "c7");
    }

    /// Backend replaying a fixed script of entry results
    struct Scripted {
        steps: VecDeque<Result<Event>>,
        opens: usize,
    }

    #[async_trait]
    impl JournalBackend for Scripted {
        async fn open(&mut self, _cursor: &str) -> Result<()> {
            self.opens += 1;
            Ok(())
        }

        async fn next(&mut self) -> Result<bool> {
            Ok(!self.steps.is_empty())
        }

        async fn wait(&mut self, _timeout: Duration) -> Result<WaitResult> {
            Ok(WaitResult::Nop)
        }

        async fn entry(&mut self) -> Result<Event> {
            self.steps.pop_front().unwrap_or(Err(JournalError::NoEntry))
        }
    }

    #[tokio::test]
    async fn test_timestamp_fault_reopens_journal() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Scripted {
            steps: VecDeque::from(vec![
                Err(JournalError::Timestamp("99".to_string())),
                Ok(event("c2")),
            ]),
            opens: 0,
        };
        let mut reader =
            JournalReader::open(backend, dir.path().join("s"), CheckpointMode::PerEntry)
                .await
                .unwrap();

        assert!(reader.next_entry().await.unwrap().is_none());
        assert_eq!(reader.backend().opens, 2);
        assert_eq!(reader.next_entry().await.unwrap().unwrap().cursor, "c2");
    }

    #[tokio::test]
    async fn test_other_faults_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Scripted {
            steps: VecDeque::from(vec![Err(JournalError::Decode("bad".to_string()))]),
            opens: 0,
        };
        let mut reader =
            JournalReader::open(backend, dir.path().join("s"), CheckpointMode::PerEntry)
                .await
                .unwrap();

        assert!(reader.next_entry().await.is_err());
    }

    #[test]
    fn test_checkpoint_mode_from_str() {
        assert_eq!("per-entry".parse::<CheckpointMode>(), Ok(CheckpointMode::PerEntry));
        assert_eq!(
            "per-iteration".parse::<CheckpointMode>(),
            Ok(CheckpointMode::PerIteration)
        );
        assert!("sometimes".parse::<CheckpointMode>().is_err());
    }
}
