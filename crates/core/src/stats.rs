// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device runtime counters and the exported statistics snapshot
//!
//! Counters are atomics read by the progress bus and the statistics
//! reporter with relaxed consistency; reads may lag a run. Everything
//! is monotonically non-decreasing except `files_downloaded`, which
//! resets at the start of every run.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct RuntimeState {
    attempted_connections: AtomicU64,
    successful_connections: AtomicU64,
    failed_connections: AtomicU64,
    attempted_dial_ups: AtomicU64,
    successful_dial_ups: AtomicU64,
    failed_dial_ups: AtomicU64,
    total_processed_files: AtomicU64,
    /// This run only; reset by `begin_run`
    files_downloaded: AtomicU64,
    total_files_downloaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    total_connected_millis: AtomicU64,
    total_dial_up_millis: AtomicU64,
    overall_tasks_count: AtomicU64,
    overall_tasks_completed: AtomicU64,
    session_started: Mutex<Option<NaiveDateTime>>,
}

macro_rules! counter {
    ($inc:ident, $get:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(inc_attempted_connections, attempted_connections, attempted_connections);
    counter!(inc_successful_connections, successful_connections, successful_connections);
    counter!(inc_failed_connections, failed_connections, failed_connections);
    counter!(inc_attempted_dial_ups, attempted_dial_ups, attempted_dial_ups);
    counter!(inc_successful_dial_ups, successful_dial_ups, successful_dial_ups);
    counter!(inc_failed_dial_ups, failed_dial_ups, failed_dial_ups);
    counter!(inc_total_processed_files, total_processed_files, total_processed_files);

    /// Called at the entry of every run
    pub fn begin_run(&self, started: NaiveDateTime) {
        self.files_downloaded.store(0, Ordering::Relaxed);
        let mut session = self.session_started.lock().unwrap_or_else(|e| e.into_inner());
        *session = Some(started);
    }

    pub fn end_run(&self) {
        let mut session = self.session_started.lock().unwrap_or_else(|e| e.into_inner());
        *session = None;
    }

    pub fn session_started(&self) -> Option<NaiveDateTime> {
        *self.session_started.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One successful download of `bytes`
    pub fn record_download(&self, bytes: u64) {
        self.files_downloaded.fetch_add(1, Ordering::Relaxed);
        self.total_files_downloaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn files_downloaded(&self) -> u64 {
        self.files_downloaded.load(Ordering::Relaxed)
    }

    pub fn total_files_downloaded(&self) -> u64 {
        self.total_files_downloaded.load(Ordering::Relaxed)
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Relaxed)
    }

    pub fn add_connected_time(&self, elapsed: Duration) {
        self.total_connected_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn add_dial_up_time(&self, elapsed: Duration) {
        self.total_dial_up_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set_overall_tasks(&self, count: u64) {
        self.overall_tasks_count.store(count, Ordering::Relaxed);
        self.overall_tasks_completed.store(0, Ordering::Relaxed);
    }

    pub fn task_completed(&self) {
        self.overall_tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn overall_tasks(&self) -> (u64, u64) {
        (
            self.overall_tasks_completed.load(Ordering::Relaxed),
            self.overall_tasks_count.load(Ordering::Relaxed),
        )
    }

    pub fn snapshot(&self, enabled: bool) -> DeviceStatistics {
        DeviceStatistics {
            attempted_connections: self.attempted_connections(),
            successful_connections: self.successful_connections(),
            failed_connections: self.failed_connections(),
            attempted_dial_ups: self.attempted_dial_ups(),
            successful_dial_ups: self.successful_dial_ups(),
            failed_dial_ups: self.failed_dial_ups(),
            files_downloaded: self.total_files_downloaded(),
            megabytes_downloaded: self.bytes_downloaded() as f64 / 1_000_000.0,
            total_connected_time: self.total_connected_millis.load(Ordering::Relaxed) / 1000,
            total_dial_up_time: self.total_dial_up_millis.load(Ordering::Relaxed) / 1000,
            enabled: u8::from(enabled),
        }
    }
}

/// Point-in-time statistics exported per device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatistics {
    pub attempted_connections: u64,
    pub successful_connections: u64,
    pub failed_connections: u64,
    pub attempted_dial_ups: u64,
    pub successful_dial_ups: u64,
    pub failed_dial_ups: u64,
    pub files_downloaded: u64,
    /// Base-1000 megabytes
    pub megabytes_downloaded: f64,
    /// Seconds
    pub total_connected_time: u64,
    /// Seconds
    pub total_dial_up_time: u64,
    pub enabled: u8,
}
