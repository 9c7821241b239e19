// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL event write-ahead log.
//!
//! Every task-lifecycle mutation is appended here before the orchestrator
//! acts on it, enabling crash recovery via full replay. Each entry is a
//! single line of JSON: `{"event":...}\n`.
//!
//! A malformed final line is tolerated on load (the process died mid
//! write); a malformed record with valid records after it means the file
//! was damaged and recovery must not proceed.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use stoker_core::WalEvent;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur in Wal operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corrupt entry at line {line}: {message}")]
    Corrupt { line: usize, message: String },
}

/// Append-only JSONL WAL for durable task events.
///
/// Callers serialize appends externally (the engine wraps the WAL in a
/// mutex); each append is synced to disk before it returns.
pub struct Wal {
    file: File,
    path: PathBuf,
}

impl Wal {
    /// Open or create a WAL at the given path.
    pub fn open(path: &Path) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    /// Path this WAL writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event as a single line and sync it to disk.
    ///
    /// Once this returns, the record survives process death.
    pub fn append(&mut self, event: &WalEvent) -> Result<(), WalError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Read all records from the file, in order.
    ///
    /// A malformed trailing line (torn write from a crash) is skipped
    /// with a warning. A malformed record that is *followed* by valid
    /// records fails with [`WalError::Corrupt`]: that is damage, not a
    /// torn tail, and replaying around it would silently lose state.
    pub fn load(&self) -> Result<Vec<WalEvent>, WalError> {
        let mut reader = BufReader::new(self.file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut events = Vec::new();
        let mut bad_line: Option<(usize, String)> = None;
        let mut line = String::new();
        let mut line_no = 0usize;

        loop {
            line.clear();
            line_no += 1;
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    // Non-UTF-8 bytes count as a malformed line
                    if bad_line.is_none() {
                        bad_line = Some((line_no, "invalid UTF-8".to_string()));
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<WalEvent>(trimmed) {
                Ok(event) => {
                    if let Some((line, message)) = bad_line.take() {
                        return Err(WalError::Corrupt { line, message });
                    }
                    events.push(event);
                }
                Err(e) => {
                    // Tolerated only if nothing valid follows
                    if bad_line.is_none() {
                        bad_line = Some((line_no, e.to_string()));
                    }
                }
            }
        }

        if let Some((line, message)) = bad_line {
            warn!(line, %message, "ignoring malformed trailing WAL line");
        }

        Ok(events)
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
