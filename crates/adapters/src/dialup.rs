// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dial-up seam
//!
//! The PPP driver is a collaborator. One modem is one shared resource:
//! callers are serialized onto the resource thread registry before any
//! dial happens, so implementations may assume single-caller access per
//! entry name.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialUpError {
    #[error("dial of entry {entry} failed: {message}")]
    DialFailed { entry: String, message: String },
    #[error("dial of entry {entry} timed out after {timeout:?}")]
    Timeout { entry: String, timeout: Duration },
    #[error("hang-up of entry {entry} failed: {message}")]
    HangUpFailed { entry: String, message: String },
}

#[async_trait]
pub trait DialUpPort: Send + Sync {
    async fn dial(&self, entry: &str, timeout: Duration) -> Result<(), DialUpError>;

    /// Best-effort; callers log and continue on failure
    async fn hang_up(&self, entry: &str) -> Result<(), DialUpError>;
}

/// Recorded dial-up event with its observation time, so tests can
/// assert strict serialization across devices sharing a modem.
#[derive(Debug, Clone)]
pub struct DialEvent {
    pub entry: String,
    pub kind: DialEventKind,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialEventKind {
    Dial,
    HangUp,
}

#[derive(Default)]
struct FakeDialUpState {
    events: Vec<DialEvent>,
    fail_entries: Vec<String>,
    dial_delay: Duration,
    line_busy: bool,
}

/// Fake modem with call recording, per-entry failure, and a dial delay
/// long enough to expose serialization violations.
#[derive(Clone, Default)]
pub struct FakeDialUp {
    state: Arc<Mutex<FakeDialUpState>>,
}

impl FakeDialUp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dial_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).dial_delay = delay;
        self
    }

    pub fn fail_entry(&self, entry: &str) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fail_entries
            .push(entry.to_string());
    }

    pub fn events(&self) -> Vec<DialEvent> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).events.clone()
    }
}

#[async_trait]
impl DialUpPort for FakeDialUp {
    async fn dial(&self, entry: &str, _timeout: Duration) -> Result<(), DialUpError> {
        let delay = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.line_busy {
                // Two concurrent dials on one modem: the registry failed
                return Err(DialUpError::DialFailed {
                    entry: entry.to_string(),
                    message: "line already in use".to_string(),
                });
            }
            state.line_busy = true;
            state.events.push(DialEvent {
                entry: entry.to_string(),
                kind: DialEventKind::Dial,
                at: Instant::now(),
            });
            state.dial_delay
        };

        tokio::time::sleep(delay).await;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.fail_entries.iter().any(|e| e == entry) {
            state.line_busy = false;
            return Err(DialUpError::DialFailed {
                entry: entry.to_string(),
                message: "no carrier".to_string(),
            });
        }
        Ok(())
    }

    async fn hang_up(&self, entry: &str) -> Result<(), DialUpError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.line_busy = false;
        state.events.push(DialEvent {
            entry: entry.to_string(),
            kind: DialEventKind::HangUp,
            at: Instant::now(),
        });
        Ok(())
    }
}
