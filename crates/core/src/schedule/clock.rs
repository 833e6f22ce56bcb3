// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minute-granularity schedule clock
//!
//! Holds named cron schedules and turns wall-clock progress into
//! `ScheduleDue` events, exactly one per matching minute per name.
//! Backward clock jumps never re-fire past minutes; forward jumps emit
//! one event per crossed matching minute (catch-up bounded to one day),
//! leaving backlog coalescing to the run-once wrapper downstream.

use super::cron::CronSchedule;
use crate::cancel::CancelToken;
use crate::clock::Clock;
use chrono::{NaiveDateTime, Timelike};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Fired when a named schedule enters a matching minute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleDue {
    pub name: String,
}

/// Longest forward jump we walk minute-by-minute
const MAX_CATCHUP_MINUTES: i64 = 24 * 60;

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

#[derive(Default)]
struct ScheduleSet {
    schedules: HashMap<String, CronSchedule>,
    last_seen: Option<NaiveDateTime>,
}

impl ScheduleSet {
    /// Advance to `now`, returning the names due in the newly entered
    /// minutes. Duplicate-suppressed: a minute is only evaluated once.
    fn due(&mut self, now: NaiveDateTime) -> Vec<String> {
        let minute = truncate_to_minute(now);
        let mut fired = Vec::new();

        let window_start = match self.last_seen {
            None => minute,
            // Same minute already evaluated, or the clock jumped back
            Some(prev) if minute <= prev => return fired,
            Some(prev) => {
                let gap = (minute - prev).num_minutes();
                if gap > MAX_CATCHUP_MINUTES {
                    minute - chrono::Duration::minutes(MAX_CATCHUP_MINUTES - 1)
                } else {
                    prev + chrono::Duration::minutes(1)
                }
            }
        };

        let mut cursor = window_start;
        while cursor <= minute {
            let mut names: Vec<&String> = self
                .schedules
                .iter()
                .filter(|(_, s)| s.matches(cursor))
                .map(|(name, _)| name)
                .collect();
            names.sort();
            fired.extend(names.into_iter().cloned());
            cursor += chrono::Duration::minutes(1);
        }

        self.last_seen = Some(minute);
        fired
    }
}

/// Cron-driven trigger source for the fleet service
#[derive(Clone)]
pub struct ScheduleClock<C: Clock> {
    set: Arc<Mutex<ScheduleSet>>,
    clock: C,
    tx: mpsc::UnboundedSender<ScheduleDue>,
}

impl<C: Clock> ScheduleClock<C> {
    /// Create the clock and the receiving end of its due-event stream
    pub fn new(clock: C) -> (Self, mpsc::UnboundedReceiver<ScheduleDue>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                set: Arc::new(Mutex::new(ScheduleSet::default())),
                clock,
                tx,
            },
            rx,
        )
    }

    pub fn add(&self, name: impl Into<String>, schedule: CronSchedule) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.schedules.insert(name.into(), schedule);
    }

    pub fn remove(&self, name: &str) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.schedules.remove(name);
    }

    /// Evaluate the current wall-clock minute and emit due events.
    /// Exposed for tests; the ticker calls this once per second.
    pub fn poll(&self) {
        let now = self.clock.wall();
        let fired = {
            let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
            set.due(now)
        };
        for name in fired {
            let _ = self.tx.send(ScheduleDue { name });
        }
    }

    /// Spawn the ticker task; it stops when `cancel` fires
    pub fn run(self, cancel: CancelToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => self.poll(),
                }
            }
            tracing::debug!("schedule clock stopped");
        })
    }
}
