// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded pool of cooperative operation threads
//!
//! Allocates lazily up to the configured cap, then hands out existing
//! threads round-robin. A cap of zero disables pooling: every request
//! gets a private thread.

use super::op_thread::OpThread;
use std::sync::Mutex;

struct PoolState {
    threads: Vec<OpThread>,
    next: usize,
}

pub struct ThreadPool {
    max: usize,
    state: Mutex<PoolState>,
}

impl ThreadPool {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            state: Mutex::new(PoolState {
                threads: Vec::new(),
                next: 0,
            }),
        }
    }

    /// Hand out a thread: lazily allocate below the cap, round-robin at
    /// the cap, private when pooling is disabled.
    pub fn create_thread(&self) -> OpThread {
        if self.max == 0 {
            return OpThread::spawn();
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.threads.len() < self.max {
            let thread = OpThread::spawn();
            state.threads.push(thread.clone());
            return thread;
        }

        let thread = state.threads[state.next].clone();
        state.next = (state.next + 1) % state.threads.len();
        thread
    }

    pub fn is_pooled(&self) -> bool {
        self.max > 0
    }

    pub fn thread_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .threads
            .len()
    }

    /// Close every pooled thread (shutdown)
    pub fn close_all(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for thread in &state.threads {
            thread.close();
        }
    }
}
