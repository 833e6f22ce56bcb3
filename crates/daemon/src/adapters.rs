// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default collaborator wiring for a bare `ffd`
//!
//! The FTP transport and the dial-up driver are deployment-specific
//! collaborators plugged in where `ffd` is packaged. A bare build runs
//! external-operation fleets end-to-end; FTP tasks fail their session
//! open with a clear message until a transport is wired in.

use async_trait::async_trait;
use ff_adapters::dialup::{DialUpError, DialUpPort};
use ff_adapters::remote::{RemoteConnector, RemoteError, RemoteSession};
use ff_core::settings::ConnectionSettings;
use std::time::Duration;

/// Fails every session open until a transport is plugged in
pub struct UnconfiguredRemote;

#[async_trait]
impl RemoteConnector for UnconfiguredRemote {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
        _timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, RemoteError> {
        Err(RemoteError::Connect {
            host: settings.host_name.clone(),
            message: "no FTP transport configured in this build".to_string(),
        })
    }
}

/// Fails every dial until a PPP driver is plugged in
pub struct UnconfiguredDialUp;

#[async_trait]
impl DialUpPort for UnconfiguredDialUp {
    async fn dial(&self, entry: &str, _timeout: Duration) -> Result<(), DialUpError> {
        Err(DialUpError::DialFailed {
            entry: entry.to_string(),
            message: "no dial-up driver configured in this build".to_string(),
        })
    }

    async fn hang_up(&self, _entry: &str) -> Result<(), DialUpError> {
        Ok(())
    }
}
