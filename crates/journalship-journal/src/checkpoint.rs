//! Checkpoint file holding the last processed journal cursor
//!
//! The file contains the raw cursor string with no framing. A missing or
//! empty file means "start from the beginning of the journal".

use std::fs;
use std::io::{self, Write};
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use tracing::info;

use crate::error::{JournalError, Result};

/// Read the persisted cursor, returning an empty string when the file is absent
pub fn read_checkpoint(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(cursor) => Ok(cursor),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("State file {} not found", path.display());
            Ok(String::new())
        }
        Err(source) => Err(JournalError::Checkpoint {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Overwrite the checkpoint file with `cursor`
pub fn write_checkpoint(path: &Path, cursor: &str) -> Result<()> {
    write_file(path, cursor).map_err(|source| JournalError::Checkpoint {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())?;
    file.flush()
}
