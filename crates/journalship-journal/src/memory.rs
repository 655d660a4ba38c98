use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use journalship_types::Event;

use crate::backend::{JournalBackend, WaitResult};
use crate::error::{JournalError, Result};

/// Journal backend fed from an in-process channel.
///
/// Used for replaying captured entries and for driving the reader in tests.
pub struct MemoryBackend {
    rx: mpsc::UnboundedReceiver<Event>,
    current: Option<Event>,
    opened_at: Vec<String>,
}

/// Create a sender/backend pair
pub fn channel() -> (mpsc::UnboundedSender<Event>, MemoryBackend) {
    let (tx, rx) = mpsc::unbounded_channel();
    let backend = MemoryBackend {
        rx,
        current: None,
        opened_at: Vec::new(),
    };
    (tx, backend)
}

impl MemoryBackend {
    /// Cursors passed to each `open` call, in order
    pub fn opened_at(&self) -> &[String] {
        &self.opened_at
    }
}

#[async_trait]
impl JournalBackend for MemoryBackend {
    async fn open(&mut self, cursor: &str) -> Result<()> {
        self.opened_at.push(cursor.to_string());
        self.current = None;
        Ok(())
    }

    async fn next(&mut self) -> Result<bool> {
        match self.rx.try_recv() {
            Ok(event) => {
                self.current = Some(event);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn wait(&mut self, timeout: Duration) -> Result<WaitResult> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(event)) => {
                self.current = Some(event);
                Ok(WaitResult::Append)
            }
            Ok(None) => {
                // Sender gone: behave like an idle journal
                tokio::time::sleep(timeout).await;
                Ok(WaitResult::Nop)
            }
            Err(_) => Ok(WaitResult::Nop),
        }
    }

    async fn entry(&mut self) -> Result<Event> {
        self.current.take().ok_or(JournalError::NoEntry)
    }
}
