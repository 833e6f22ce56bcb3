// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling
//!
//! Scheduling and path templating are wall-clock concerns while tick
//! accounting and timeouts are monotonic ones, so the trait exposes both.

use chrono::{Local, NaiveDateTime};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A clock providing monotonic instants and local wall time
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant, for durations and tick accounting
    fn now(&self) -> Instant;

    /// Local wall-clock time, for cron matching and date templating
    fn wall(&self) -> NaiveDateTime;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Fake clock for testing with controllable time
///
/// `advance` moves both the monotonic and wall components so timeout
/// and schedule logic stay consistent with each other in tests.
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<(Instant, NaiveDateTime)>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::at(Local::now().naive_local())
    }

    /// Create a fake clock pinned to the given wall time
    pub fn at(wall: NaiveDateTime) -> Self {
        Self {
            current: Arc::new(Mutex::new((Instant::now(), wall))),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.0 += duration;
        current.1 += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }

    /// Set the wall-clock component only (models a system clock jump)
    pub fn set_wall(&self, wall: NaiveDateTime) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.1 = wall;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn wall(&self) -> NaiveDateTime {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).1
    }
}
