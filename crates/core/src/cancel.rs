// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot cancellation signal woven through long-running work
//!
//! Reads are lock-free and the flip is visible to every observer before
//! any subsequent checked suspension returns. There is no reset.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Returned by [`CancelToken::checkpoint`] once the token has fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Fan-out one-shot cancellation token
///
/// Cloning shares the underlying signal; every loop in the engine calls
/// `checkpoint()?` before its next blocking call.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Early-return point for loops: `token.checkpoint()?`
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.inner.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the token fires; used in `select!` arms around I/O
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}
