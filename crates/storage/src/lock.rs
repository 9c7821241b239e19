// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory leader lock.
//!
//! Exactly one orchestrator may own a WAL at a time. The lock is an
//! OS-level exclusive file lock held for the orchestrator's active
//! lifetime and released on drop; the holder's PID is written into the
//! file for diagnostics.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::warn;

/// Leader lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("leader lock already held: {0}")]
    Held(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Exclusive advisory lock on a filesystem path.
pub struct LeaderLock {
    path: PathBuf,
    file: File,
}

impl LeaderLock {
    /// Try to acquire the lock without blocking.
    ///
    /// Opens without truncating so a failed attempt does not wipe the
    /// running holder's PID.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LockError::Held(path.to_owned()));
        }

        // Now that we hold the lock, record our PID
        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        Ok(Self {
            path: path.to_owned(),
            file,
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LeaderLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release leader lock");
        }
        // The file itself is left in place; the next holder rewrites it.
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
