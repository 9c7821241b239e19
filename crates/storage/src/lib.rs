// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durability layer for Stoker: write-ahead log and leader lock.

mod lock;
mod wal;

pub use lock::{LeaderLock, LockError};
pub use wal::{Wal, WalError};
