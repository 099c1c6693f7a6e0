// Copyright (C) 2024  INO Quantum Systems
//
// This file is part of the DIO64 board coordination library.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

//! Connect-failure policy (`§9`, Design Notes).
//!
//! The source popped a modal `MessageBox` (Abort/Retry/Ignore) from inside the
//! worker thread when a connect attempt failed. A GUI dependency has no place
//! in the core, so the decision is a pure callback supplied at configuration
//! time instead: [`ConnectPolicy::on_connect_failure`] returns one of the same
//! three outcomes, synchronously, with no I/O of its own.

use async_trait::async_trait;
use std::sync::Arc;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ConnectDecision {
    Abort,
    Retry,
    Ignore,
}

#[async_trait]
pub trait ConnectPolicy: Send + Sync {
    async fn on_connect_failure(&self, resource: &str, attempt: u32, error: &str) -> ConnectDecision;
}

pub type SharedConnectPolicy = Arc<dyn ConnectPolicy>;

/// Retries a bounded number of times with linear backoff, then aborts. This
/// is the default policy when none is configured - fail-fast is available via
/// [`FailFastPolicy`] for callers who would rather surface the error
/// immediately (e.g. automated test harnesses).
pub struct RetryWithBackoff {
    pub max_attempts: u32,
    pub backoff: std::time::Duration,
}

impl Default for RetryWithBackoff {
    fn default() -> Self {
        RetryWithBackoff {
            max_attempts: 3,
            backoff: std::time::Duration::from_millis(250),
        }
    }
}

#[async_trait]
impl ConnectPolicy for RetryWithBackoff {
    async fn on_connect_failure(&self, _resource: &str, attempt: u32, _error: &str) -> ConnectDecision {
        if attempt < self.max_attempts {
            tokio::time::sleep(self.backoff * attempt.max(1)).await;
            ConnectDecision::Retry
        } else {
            ConnectDecision::Abort
        }
    }
}

pub struct FailFastPolicy;

#[async_trait]
impl ConnectPolicy for FailFastPolicy {
    async fn on_connect_failure(&self, _resource: &str, _attempt: u32, _error: &str) -> ConnectDecision {
        ConnectDecision::Abort
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn retry_policy_aborts_after_max_attempts() {
        let policy = RetryWithBackoff {
            max_attempts: 2,
            backoff: std::time::Duration::from_millis(1),
        };
        assert_eq!(
            policy.on_connect_failure("x", 1, "e").await,
            ConnectDecision::Retry
        );
        assert_eq!(
            policy.on_connect_failure("x", 2, "e").await,
            ConnectDecision::Abort
        );
    }

    #[tokio::test]
    async fn fail_fast_always_aborts() {
        assert_eq!(
            FailFastPolicy.on_connect_failure("x", 1, "e").await,
            ConnectDecision::Abort
        );
    }
}
