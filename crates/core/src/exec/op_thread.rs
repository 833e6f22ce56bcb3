// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative operation thread
//!
//! A FIFO of boxed async operations drained by a dedicated task with
//! at-most-one operation in flight. High-priority enqueues jump ahead
//! of normal ones; ordering is FIFO within a priority. A failing or
//! panicking operation is surfaced on the unhandled-error channel and
//! the drainer moves on to the next operation.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{broadcast, Notify};

/// Errors escaping an operation are boxed; the engine's operations do
/// their own handling, so anything landing here is a defect surfaced
/// rather than swallowed.
pub type OpError = Box<dyn std::error::Error + Send + Sync>;
pub type OpFuture = BoxFuture<'static, Result<(), OpError>>;
pub type Operation = Box<dyn FnOnce() -> OpFuture + Send + 'static>;

/// Only two ranks exist; High is reserved for the dial-up path so a
/// manual trigger can preempt background runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Normal = 1,
    High = 2,
}

/// Broadcast to registrants when an operation fails or panics
#[derive(Debug, Clone)]
pub struct OpFailure {
    pub label: String,
    pub error: String,
}

#[derive(Debug, Error)]
#[error("operation thread is closed")]
pub struct OpThreadClosed;

struct QueuedOp {
    label: String,
    op: Operation,
}

struct OpQueues {
    high: VecDeque<QueuedOp>,
    normal: VecDeque<QueuedOp>,
}

struct Inner {
    queues: Mutex<OpQueues>,
    notify: Notify,
    errors: broadcast::Sender<OpFailure>,
    closed: AtomicBool,
    busy: AtomicBool,
}

/// Handle to a cooperative operation thread; clones share the queue
#[derive(Clone)]
pub struct OpThread {
    inner: Arc<Inner>,
}

impl OpThread {
    pub fn spawn() -> Self {
        Self::spawn_with_queue_hint(16)
    }

    /// `hint` pre-sizes the queues; resource-pinned threads use a small
    /// hint since at most a couple of devices queue behind a modem.
    pub fn spawn_with_queue_hint(hint: usize) -> Self {
        let (errors, _) = broadcast::channel(32);
        let inner = Arc::new(Inner {
            queues: Mutex::new(OpQueues {
                high: VecDeque::with_capacity(hint),
                normal: VecDeque::with_capacity(hint),
            }),
            notify: Notify::new(),
            errors,
            closed: AtomicBool::new(false),
            busy: AtomicBool::new(false),
        });

        let worker = Arc::clone(&inner);
        tokio::spawn(async move {
            loop {
                let next = {
                    // busy flips inside the lock so an observer always
                    // sees queued work or a running operation
                    let mut queues = worker.queues.lock().unwrap_or_else(|e| e.into_inner());
                    let popped = queues.high.pop_front().or_else(|| queues.normal.pop_front());
                    if popped.is_some() {
                        worker.busy.store(true, Ordering::SeqCst);
                    }
                    popped
                };

                match next {
                    Some(queued) => {
                        let outcome = AssertUnwindSafe((queued.op)()).catch_unwind().await;
                        worker.busy.store(false, Ordering::SeqCst);

                        let error = match outcome {
                            Ok(Ok(())) => None,
                            Ok(Err(e)) => Some(e.to_string()),
                            Err(panic) => Some(panic_message(panic)),
                        };
                        if let Some(error) = error {
                            tracing::warn!(label = %queued.label, %error, "unhandled operation error");
                            let _ = worker.errors.send(OpFailure {
                                label: queued.label,
                                error,
                            });
                        }
                    }
                    None => {
                        if worker.closed.load(Ordering::SeqCst) {
                            break;
                        }
                        worker.notify.notified().await;
                    }
                }
            }
        });

        Self { inner }
    }

    /// Queue an operation. FIFO within a priority; High drains first.
    pub fn enqueue(
        &self,
        label: impl Into<String>,
        priority: Priority,
        op: Operation,
    ) -> Result<(), OpThreadClosed> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(OpThreadClosed);
        }
        {
            let mut queues = self.inner.queues.lock().unwrap_or_else(|e| e.into_inner());
            let queued = QueuedOp {
                label: label.into(),
                op,
            };
            match priority {
                Priority::High => queues.high.push_back(queued),
                Priority::Normal => queues.normal.push_back(queued),
            }
        }
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Register for unhandled-error events
    pub fn subscribe_errors(&self) -> broadcast::Receiver<OpFailure> {
        self.inner.errors.subscribe()
    }

    /// Stop the drainer once the current operation finishes; queued
    /// operations that have not started are dropped.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        {
            let mut queues = self.inner.queues.lock().unwrap_or_else(|e| e.into_inner());
            queues.high.clear();
            queues.normal.clear();
        }
        self.inner.notify.notify_one();
    }

    pub fn queued_len(&self) -> usize {
        let queues = self.inner.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.high.len() + queues.normal.len()
    }

    /// True while an operation is executing
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    /// Two handles draining the same queue compare equal
    pub fn same_thread(&self, other: &OpThread) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("operation panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("operation panicked: {s}")
    } else {
        "operation panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn recording_op(
        tx: mpsc::UnboundedSender<&'static str>,
        tag: &'static str,
    ) -> Operation {
        Box::new(move || {
            async move {
                let _ = tx.send(tag);
                Ok(())
            }
            .boxed()
        })
    }

    async fn settle(thread: &OpThread) {
        while thread.queued_len() > 0 || thread.is_busy() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn operations_run_in_fifo_order() {
        let thread = OpThread::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for tag in ["first", "second", "third"] {
            thread
                .enqueue(tag, Priority::Normal, recording_op(tx.clone(), tag))
                .unwrap();
        }
        settle(&thread).await;

        assert_eq!(rx.try_recv().unwrap(), "first");
        assert_eq!(rx.try_recv().unwrap(), "second");
        assert_eq!(rx.try_recv().unwrap(), "third");
    }

    #[tokio::test]
    async fn high_priority_jumps_ahead_of_normal() {
        let thread = OpThread::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();

        // Block the drainer so later enqueues land while it is busy
        thread
            .enqueue(
                "gate",
                Priority::Normal,
                Box::new(move || {
                    async move {
                        let _ = gate_rx.await;
                        Ok(())
                    }
                    .boxed()
                }),
            )
            .unwrap();

        thread
            .enqueue("n1", Priority::Normal, recording_op(tx.clone(), "n1"))
            .unwrap();
        thread
            .enqueue("h1", Priority::High, recording_op(tx.clone(), "h1"))
            .unwrap();
        thread
            .enqueue("h2", Priority::High, recording_op(tx.clone(), "h2"))
            .unwrap();

        gate_tx.send(()).unwrap();
        settle(&thread).await;

        assert_eq!(rx.try_recv().unwrap(), "h1");
        assert_eq!(rx.try_recv().unwrap(), "h2");
        assert_eq!(rx.try_recv().unwrap(), "n1");
    }

    #[tokio::test]
    async fn at_most_one_operation_in_flight() {
        let thread = OpThread::spawn();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            thread
                .enqueue(
                    "probe",
                    Priority::Normal,
                    Box::new(move || {
                        async move {
                            let live = current.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(live, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            current.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        }
                        .boxed()
                    }),
                )
                .unwrap();
        }
        settle(&thread).await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_operation_surfaces_and_drainer_continues() {
        let thread = OpThread::spawn();
        let mut errors = thread.subscribe_errors();
        let (tx, mut rx) = mpsc::unbounded_channel();

        thread
            .enqueue(
                "broken",
                Priority::Normal,
                Box::new(|| async { Err::<(), OpError>("remote unreachable".into()) }.boxed()),
            )
            .unwrap();
        thread
            .enqueue("after", Priority::Normal, recording_op(tx.clone(), "after"))
            .unwrap();
        settle(&thread).await;

        let failure = errors.recv().await.unwrap();
        assert_eq!(failure.label, "broken");
        assert!(failure.error.contains("remote unreachable"));
        assert_eq!(rx.try_recv().unwrap(), "after");
    }

    #[tokio::test]
    async fn panicking_operation_does_not_kill_the_thread() {
        let thread = OpThread::spawn();
        let mut errors = thread.subscribe_errors();
        let (tx, mut rx) = mpsc::unbounded_channel();

        thread
            .enqueue(
                "explosive",
                Priority::Normal,
                Box::new(|| {
                    async {
                        panic!("boom");
                    }
                    .boxed()
                }),
            )
            .unwrap();
        thread
            .enqueue("alive", Priority::Normal, recording_op(tx.clone(), "alive"))
            .unwrap();
        settle(&thread).await;

        let failure = errors.recv().await.unwrap();
        assert!(failure.error.contains("boom"));
        assert_eq!(rx.try_recv().unwrap(), "alive");
    }

    #[tokio::test]
    async fn closed_thread_rejects_enqueues() {
        let thread = OpThread::spawn();
        thread.close();
        let result = thread.enqueue(
            "late",
            Priority::Normal,
            Box::new(|| async { Ok(()) }.boxed()),
        );
        assert!(result.is_err());
    }
}
