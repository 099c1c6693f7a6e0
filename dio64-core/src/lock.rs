// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! The single system-wide named mutex that serializes public API access
//! across in-process callers (`§4.4`, `§5`).
//!
//! The source paired this with a recursive "lock count" escape hatch so a
//! worker could briefly drop the lock while the façade waited on its own
//! re-open response. Per `§9`'s recommended strategy, that escape hatch is
//! gone: the façade never holds this lock across an `await` on a worker's
//! recv queue (see `facade::open_or_reuse_one`), so the lock order
//! "registry lock -> queue critical section" never needs to unwind partway.

use crate::error::{Error, ErrorKind, Result};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Stable name for the lock, documented for operators correlating logs
/// across processes; cross-process enforcement is out of scope for this
/// core (`§1` Non-goals) and would be layered on by the host application.
pub const LOCK_NAME: &str = "dio64-coordination-lock";

/// Default bound on how long a caller waits to acquire [`ProcessLock`] before
/// the call fails with `ErrorKind::Lock`.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct ProcessLock {
    inner: Mutex<()>,
}

impl ProcessLock {
    pub fn new() -> Self {
        ProcessLock {
            inner: Mutex::new(()),
        }
    }

    pub async fn acquire(&self) -> Result<MutexGuard<'_, ()>> {
        self.acquire_within(DEFAULT_ACQUIRE_TIMEOUT).await
    }

    pub async fn acquire_within(&self, timeout: Duration) -> Result<MutexGuard<'_, ()>> {
        tokio::time::timeout(timeout, self.inner.lock())
            .await
            .map_err(|_| Error::from(ErrorKind::Lock))
    }
}

impl Default for ProcessLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn second_acquire_times_out_while_first_is_held() {
        let lock = ProcessLock::new();
        let guard = lock.acquire().await.unwrap();
        let err = lock
            .acquire_within(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::codes::ERROR_LOCK);
        drop(guard);
        assert!(lock.acquire_within(Duration::from_millis(20)).await.is_ok());
    }
}
