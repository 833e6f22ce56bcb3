// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network-share authentication seam
//!
//! Tasks may point their local path at a UNC share with `domain\user`
//! credentials. Establishing those credentials is platform plumbing and
//! lives behind this trait; a failure is a warning and the task
//! proceeds (it may later fail on write).

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credentials must be domain\\user, got {0:?}")]
    BadUserFormat(String),
    #[error("authentication to {share} failed: {message}")]
    Failed { share: String, message: String },
}

/// Split `domain\user` into its parts
pub fn split_domain_user(value: &str) -> Result<(&str, &str), AuthError> {
    match value.split_once('\\') {
        Some((domain, user)) if !domain.is_empty() && !user.is_empty() => Ok((domain, user)),
        _ => Err(AuthError::BadUserFormat(value.to_string())),
    }
}

#[async_trait]
pub trait ShareAuth: Send + Sync {
    /// Establish credentials for `path`; held for the service lifetime
    async fn authenticate(
        &self,
        path: &Path,
        user: &str,
        password: &str,
    ) -> Result<(), AuthError>;
}

/// Default on platforms without share credentials
#[derive(Clone, Default)]
pub struct NoopShareAuth;

#[async_trait]
impl ShareAuth for NoopShareAuth {
    async fn authenticate(
        &self,
        path: &Path,
        user: &str,
        _password: &str,
    ) -> Result<(), AuthError> {
        split_domain_user(user)?;
        tracing::debug!(path = %path.display(), user, "share auth skipped (noop)");
        Ok(())
    }
}

/// Recording fake for tests
#[derive(Clone, Default)]
pub struct FakeShareAuth {
    calls: Arc<Mutex<Vec<(String, String)>>>,
    fail: Arc<Mutex<bool>>,
}

impl FakeShareAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    /// (path, user) pairs in call order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ShareAuth for FakeShareAuth {
    async fn authenticate(
        &self,
        path: &Path,
        user: &str,
        _password: &str,
    ) -> Result<(), AuthError> {
        split_domain_user(user)?;
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((path.display().to_string(), user.to_string()));
        if *self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(AuthError::Failed {
                share: path.display().to_string(),
                message: "access denied".to_string(),
            });
        }
        Ok(())
    }
}
