// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coalescing "run now" wrapper over a cooperative thread
//!
//! Any number of concurrent triggers collapse into at most one queued
//! run plus one pending re-run: `{Idle, Running, RunningPending}` under
//! a mutex, exactly as many executions as the state machine admits, and
//! at least one execution starting after the most recent trigger.

use super::op_thread::{OpFuture, OpThread, Priority};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    RunningPending,
}

struct Inner {
    thread: OpThread,
    label: String,
    op: Box<dyn Fn() -> OpFuture + Send + Sync>,
    priority: Mutex<Priority>,
    state: Mutex<RunState>,
    /// Count of completed runs; backs the blocking variant
    done_tx: watch::Sender<u64>,
}

/// Coalesced run-once operation bound to one cooperative thread
#[derive(Clone)]
pub struct RunOnce {
    inner: Arc<Inner>,
}

impl RunOnce {
    pub fn new(
        thread: OpThread,
        label: impl Into<String>,
        op: impl Fn() -> OpFuture + Send + Sync + 'static,
    ) -> Self {
        let (done_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Inner {
                thread,
                label: label.into(),
                op: Box::new(op),
                priority: Mutex::new(Priority::Normal),
                state: Mutex::new(RunState::Idle),
                done_tx,
            }),
        }
    }

    /// Priority applied to enqueues from this point on
    pub fn set_priority(&self, priority: Priority) {
        *self.inner.priority.lock().unwrap_or_else(|e| e.into_inner()) = priority;
    }

    /// Request one run; coalesces with an already-queued or pending one.
    pub fn trigger(&self) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            RunState::Idle => {
                if Self::enqueue(&self.inner) {
                    *state = RunState::Running;
                }
            }
            RunState::Running => *state = RunState::RunningPending,
            RunState::RunningPending => {}
        }
    }

    /// Request a run and wait until a run that started at or after this
    /// call has finished.
    pub async fn run_to_completion(&self) {
        let mut done_rx = self.inner.done_tx.subscribe();
        let target = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            let completed = *self.inner.done_tx.borrow();
            match *state {
                RunState::Idle => {
                    if !Self::enqueue(&self.inner) {
                        // Thread closed; no run will ever start
                        return;
                    }
                    *state = RunState::Running;
                    completed + 1
                }
                RunState::Running => {
                    // The in-flight run predates this call; wait for the
                    // pending re-run it forces.
                    *state = RunState::RunningPending;
                    completed + 2
                }
                RunState::RunningPending => completed + 2,
            }
        };

        while *done_rx.borrow_and_update() < target {
            if done_rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Queue the wrapped operation; returns false when the thread is
    /// closed. Never touches `state`: callers hold that lock.
    fn enqueue(inner: &Arc<Inner>) -> bool {
        let priority = *inner.priority.lock().unwrap_or_else(|e| e.into_inner());
        let run_inner = Arc::clone(inner);
        let result = inner.thread.enqueue(
            inner.label.clone(),
            priority,
            Box::new(move || {
                Box::pin(async move {
                    let outcome = (run_inner.op)().await;
                    Self::on_complete(&run_inner);
                    outcome
                })
            }),
        );
        if result.is_err() {
            tracing::debug!(label = %inner.label, "run dropped: thread closed");
        }
        result.is_ok()
    }

    fn on_complete(inner: &Arc<Inner>) {
        let mut state = inner.state.lock().unwrap_or_else(|e| e.into_inner());
        inner.done_tx.send_modify(|done| *done += 1);
        match *state {
            RunState::RunningPending => {
                if Self::enqueue(inner) {
                    *state = RunState::Running;
                } else {
                    *state = RunState::Idle;
                    // The forced re-run can never happen; release any
                    // waiter counting on it.
                    inner.done_tx.send_modify(|done| *done += 1);
                }
            }
            _ => *state = RunState::Idle,
        }
    }

    /// Completed run count, for tests and statistics
    pub fn completed_runs(&self) -> u64 {
        *self.inner.done_tx.borrow()
    }
}
