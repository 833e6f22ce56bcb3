// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource-serialized thread registry
//!
//! Devices sharing one physical resource (a modem, identified by its
//! dial-up entry name) must never run concurrently, so each resource
//! key pins exactly one cooperative thread shared process-wide.

use super::op_thread::OpThread;
use std::collections::HashMap;
use std::sync::Mutex;

/// Depth hint for resource-pinned queues: rarely more than a couple of
/// devices wait behind one modem.
const RESOURCE_QUEUE_HINT: usize = 2;

#[derive(Default)]
pub struct ResourceThreads {
    threads: Mutex<HashMap<String, OpThread>>,
}

impl ResourceThreads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread pinned to `key`, created on first use
    pub fn get_or_add(&self, key: &str) -> OpThread {
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        threads
            .entry(key.to_string())
            .or_insert_with(|| OpThread::spawn_with_queue_hint(RESOURCE_QUEUE_HINT))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.threads.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every resource thread (shutdown)
    pub fn close_all(&self) {
        let threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        for thread in threads.values() {
            thread.close();
        }
    }
}
