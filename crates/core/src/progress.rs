// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress bus for live transfer updates
//!
//! Subscribers get their own unbounded channel, so delivery never
//! back-pressures the transfer engine; a subscriber that falls behind
//! simply buffers, and one that goes away is pruned on the next send.
//! Publishers choose between broadcast and unicast per update.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressState {
    Processing,
    Skipped,
    Succeeded,
    Failed,
    /// Terminal for a run; everything else is per-unit
    Finished,
}

/// One decision point in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub state: ProgressState,
    pub summary: Option<String>,
    pub message: String,
    /// Bytes accounted so far; non-decreasing within a run
    pub complete: u64,
    pub total: u64,
}

impl ProgressUpdate {
    pub fn new(state: ProgressState, message: impl Into<String>) -> Self {
        Self {
            state,
            summary: None,
            message: message.into(),
            complete: 0,
            total: 0,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_progress(mut self, complete: u64, total: u64) -> Self {
        self.complete = complete;
        self.total = total;
        self
    }
}

/// Delivered payload: the device the updates belong to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProgress {
    pub device: String,
    pub updates: Vec<ProgressUpdate>,
}

impl DeviceProgress {
    pub fn one(device: impl Into<String>, update: ProgressUpdate) -> Self {
        Self {
            device: device.into(),
            updates: vec![update],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub String);

/// Fan-out hub: broadcast to everyone or unicast to one client id
#[derive(Clone, Default)]
pub struct ProgressBus {
    subscribers: Arc<RwLock<HashMap<SubscriberId, mpsc::UnboundedSender<DeviceProgress>>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, id: impl Into<String>) -> mpsc::UnboundedReceiver<DeviceProgress> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subs.insert(SubscriberId(id.into()), tx);
        rx
    }

    pub fn unsubscribe(&self, id: &str) {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subs.remove(&SubscriberId(id.to_string()));
    }

    /// Deliver to every live subscriber, pruning closed ones
    pub fn broadcast(&self, progress: DeviceProgress) {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subs.retain(|_, tx| tx.send(progress.clone()).is_ok());
    }

    /// Deliver to a single client; silently dropped if unknown or gone
    pub fn send_to(&self, client: &str, progress: DeviceProgress) {
        let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = subs.get(&SubscriberId(client.to_string())) {
            let _ = tx.send(progress);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
