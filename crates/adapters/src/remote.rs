// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote session seam
//!
//! The FTP protocol client is a collaborator, not part of this engine;
//! everything the transfer engine needs from it sits behind these two
//! traits. `RemoteConnector` opens sessions, `RemoteSession` is one
//! live connection with a working directory.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use ff_core::settings::ConnectionSettings;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("connect to {host} failed: {message}")]
    Connect { host: String, message: String },
    #[error("connect to {host} timed out after {timeout:?}")]
    ConnectTimeout { host: String, timeout: Duration },
    #[error("listing {path} failed: {message}")]
    List { path: String, message: String },
    #[error("download of {path} failed: {message}")]
    Download { path: String, message: String },
    #[error("remove of {path} failed: {message}")]
    Remove { path: String, message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry of a remote directory listing
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub name: String,
    /// Full remote path
    pub path: String,
    pub size: u64,
    pub modified: NaiveDateTime,
    pub is_dir: bool,
}

/// A live connection to a device's file area
#[async_trait]
pub trait RemoteSession: Send {
    /// List the entries of `path` (non-recursive)
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Fetch `remote` into the local file `local`
    async fn download(&mut self, remote: &str, local: &Path) -> Result<(), RemoteError>;

    /// Delete a remote file
    async fn remove(&mut self, remote: &str) -> Result<(), RemoteError>;

    /// Close the session; best-effort
    async fn close(&mut self) -> Result<(), RemoteError>;
}

/// Opens sessions from a device's connection settings
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, RemoteError>;
}
