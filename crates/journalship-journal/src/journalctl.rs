//! Journal backend driven by `journalctl --output=json --follow`

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info};

use journalship_types::Event;

use crate::backend::{JournalBackend, WaitResult};
use crate::error::{JournalError, Result};

const CURSOR_FIELD: &str = "__CURSOR";
const REALTIME_FIELD: &str = "__REALTIME_TIMESTAMP";

/// Reads the journal through a long-running `journalctl` child process
pub struct JournalctlBackend {
    /// Path to the journalctl binary
    program: PathBuf,

    /// Running child, if any
    child: Option<Child>,

    /// Line reader over the child's stdout
    lines: Option<Lines<BufReader<ChildStdout>>>,

    /// Line positioned by the last successful `next`/`wait`
    current: Option<String>,

    /// Cursor of the last entry handed out, used to resume after the child exits
    last_cursor: String,

    /// The child closed its stdout
    exited: bool,
}

impl JournalctlBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            child: None,
            lines: None,
            current: None,
            last_cursor: String::new(),
            exited: false,
        }
    }

    fn args(cursor: &str) -> Vec<String> {
        // --all keeps large and binary fields instead of eliding them
        let mut args = vec![
            "--output=json".to_string(),
            "--follow".to_string(),
            "--no-tail".to_string(),
            "--all".to_string(),
            "--no-pager".to_string(),
        ];
        if !cursor.is_empty() {
            args.push(format!("--after-cursor={}", cursor));
        }
        args
    }

    async fn stop(&mut self) {
        self.lines = None;
        self.current = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!("journalctl already gone: {}", e);
            }
        }
    }

    fn stage(&mut self, line: String) {
        self.current = Some(line);
    }

    /// The child closed its stdout. A clean exit is reopened on the next
    /// `wait`; any other status is fatal.
    async fn reap(&mut self) -> Result<()> {
        self.lines = None;
        if let Some(mut child) = self.child.take() {
            let status = child.wait().await?;
            if !status.success() {
                return Err(JournalError::Exited(status));
            }
            debug!("journalctl exited cleanly");
        }
        self.exited = true;
        Ok(())
    }
}

impl Default for JournalctlBackend {
    fn default() -> Self {
        Self::new("journalctl")
    }
}

#[async_trait]
impl JournalBackend for JournalctlBackend {
    async fn open(&mut self, cursor: &str) -> Result<()> {
        self.stop().await;

        info!("Opening journal");
        let mut child = Command::new(&self.program)
            .args(Self::args(cursor))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(JournalError::Spawn)?;

        let stdout = child.stdout.take().ok_or_else(|| {
            JournalError::Spawn(std::io::Error::other("journalctl stdout not captured"))
        })?;

        self.lines = Some(BufReader::new(stdout).lines());
        self.child = Some(child);
        self.last_cursor = cursor.to_string();
        self.exited = false;
        Ok(())
    }

    async fn next(&mut self) -> Result<bool> {
        if self.exited {
            return Ok(false);
        }
        let Some(lines) = self.lines.as_mut() else {
            return Ok(false);
        };

        // A zero timeout still polls the read once, so buffered lines are returned
        match tokio::time::timeout(Duration::ZERO, lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                self.stage(line);
                Ok(true)
            }
            Ok(Ok(None)) => {
                self.reap().await?;
                Ok(false)
            }
            Ok(Err(e)) => Err(JournalError::Io(e)),
            Err(_) => Ok(false),
        }
    }

    async fn wait(&mut self, timeout: Duration) -> Result<WaitResult> {
        if self.exited {
            // journalctl went away (e.g. journal files rotated out from under it)
            let cursor = self.last_cursor.clone();
            self.open(&cursor).await?;
            return Ok(WaitResult::Invalidate);
        }
        let Some(lines) = self.lines.as_mut() else {
            return Ok(WaitResult::Nop);
        };

        match tokio::time::timeout(timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                self.stage(line);
                Ok(WaitResult::Append)
            }
            Ok(Ok(None)) => {
                self.reap().await?;
                Ok(WaitResult::Nop)
            }
            Ok(Err(e)) => Err(JournalError::Io(e)),
            Err(_) => Ok(WaitResult::Nop),
        }
    }

    async fn entry(&mut self) -> Result<Event> {
        let line = self.current.take().ok_or(JournalError::NoEntry)?;
        let event = parse_entry(&line)?;
        self.last_cursor = event.cursor.clone();
        Ok(event)
    }
}

/// Decode one line of `journalctl --output=json`
pub fn parse_entry(line: &str) -> Result<Event> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| JournalError::Decode(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(JournalError::Decode("entry is not a JSON object".to_string()));
    };

    let cursor = obj
        .get(CURSOR_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| JournalError::Decode("entry has no cursor".to_string()))?
        .to_string();

    let realtime_timestamp = obj
        .get(REALTIME_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| JournalError::Decode(format!("entry {} has no realtime timestamp", cursor)))?
        .parse::<u64>()
        .map_err(|e| JournalError::Decode(format!("entry {} timestamp: {}", cursor, e)))?;

    let mut event = Event::new(cursor, realtime_timestamp);
    for (key, value) in obj {
        if key.starts_with("__") {
            continue;
        }
        if let Some(text) = field_text(&value) {
            event.fields.insert(key, text);
        }
    }
    Ok(event)
}

/// Journal field values are strings, byte arrays (binary data) or arrays
/// of those (repeated fields; the last value wins).
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.iter().all(Value::is_u64) => {
            let bytes: Vec<u8> = items
                .iter()
                .filter_map(Value::as_u64)
                .map(|b| b as u8)
                .collect();
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        Value::Array(items) => items.iter().rev().find_map(field_text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        let line = r#"{"__CURSOR":"s=5a80;i=1","__REALTIME_TIMESTAMP":"1527115596680939","__MONOTONIC_TIMESTAMP":"1581876","MESSAGE":"Linux version 4.14.32","_TRANSPORT":"kernel","SYSLOG_IDENTIFIER":"kernel"}"#;
        let event = parse_entry(line).unwrap();
        assert_eq!(event.cursor, "s=5a80;i=1");
        assert_eq!(event.realtime_timestamp, 1_527_115_596_680_939);
        assert_eq!(event.transport(), "kernel");
        assert_eq!(event.message(), "Linux version 4.14.32");
        assert!(!event.fields.contains_key("__MONOTONIC_TIMESTAMP"));
    }

    #[test]
    fn test_parse_binary_and_repeated_fields() {
        let line = r#"{"__CURSOR":"c","__REALTIME_TIMESTAMP":"1","MESSAGE":[104,105],"TAG":["a","b"],"GONE":null}"#;
        let event = parse_entry(line).unwrap();
        assert_eq!(event.message(), "hi");
        assert_eq!(event.field("TAG"), "b");
        assert!(!event.fields.contains_key("GONE"));
    }

    #[test]
    fn test_missing_timestamp_is_fatal() {
        // Reopening at the same cursor would yield the same line again
        let err = parse_entry(r#"{"__CURSOR":"c","MESSAGE":"x"}"#).unwrap_err();
        assert!(matches!(err, JournalError::Decode(_)));
        assert!(!err.is_transient());

        let err = parse_entry(r#"{"__CURSOR":"c","__REALTIME_TIMESTAMP":"soon"}"#).unwrap_err();
        assert!(matches!(err, JournalError::Decode(_)));
    }

    #[test]
    fn test_missing_cursor_is_fatal() {
        let err = parse_entry(r#"{"MESSAGE":"x"}"#).unwrap_err();
        assert!(matches!(err, JournalError::Decode(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_args_seek_after_cursor() {
        let args = JournalctlBackend::args("s=1");
        assert!(args.contains(&"--after-cursor=s=1".to_string()));
        assert!(args.contains(&"--all".to_string()));
        assert!(!JournalctlBackend::args("").iter().any(|a| a.starts_with("--after-cursor")));
    }

    #[cfg(unix)]
    fn fake_journalctl(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("journalctl");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Drive the backend the way the reader does until it errors or reopens
    async fn drain(backend: &mut JournalctlBackend) -> Result<WaitResult> {
        for _ in 0..50 {
            while backend.next().await? {
                backend.entry().await?;
            }
            match backend.wait(Duration::from_millis(100)).await? {
                WaitResult::Invalidate => return Ok(WaitResult::Invalidate),
                WaitResult::Append => {
                    backend.entry().await?;
                }
                WaitResult::Nop => {}
            }
        }
        Ok(WaitResult::Nop)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_journalctl_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_journalctl(dir.path(), "echo 'Failed to seek to cursor' >&2\nexit 1");

        let mut backend = JournalctlBackend::new(script);
        backend.open("garbage").await.unwrap();
        let err = drain(&mut backend).await.unwrap_err();
        assert!(matches!(err, JournalError::Exited(status) if status.code() == Some(1)));
        assert!(!err.is_transient());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_reopens_after_last_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_journalctl(
            dir.path(),
            r#"echo '{"__CURSOR":"s=1","__REALTIME_TIMESTAMP":"1","MESSAGE":"x"}'"#,
        );

        let mut backend = JournalctlBackend::new(script);
        backend.open("").await.unwrap();
        assert_eq!(drain(&mut backend).await.unwrap(), WaitResult::Invalidate);
        assert_eq!(backend.last_cursor, "s=1");
        assert!(!backend.exited);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reader_stops_on_unseekable_checkpoint() {
        use crate::reader::{CheckpointMode, JournalReader};

        let dir = tempfile::tempdir().unwrap();
        let script = fake_journalctl(dir.path(), "echo 'Failed to seek to cursor' >&2\nexit 1");
        let state = dir.path().join("state");
        std::fs::write(&state, "garbage").unwrap();

        let backend = JournalctlBackend::new(script);
        let mut reader = JournalReader::open(backend, &state, CheckpointMode::PerEntry)
            .await
            .unwrap()
            .with_wait_time(Duration::from_millis(100));

        let mut result = Ok(None);
        for _ in 0..50 {
            result = reader.next_entry().await;
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(JournalError::Exited(_))));
    }
}
