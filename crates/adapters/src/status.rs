// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status-store seam
//!
//! The relational layer (device / profile / status-log tables) is a
//! collaborator; the engine only needs task loading and outcome writes.
//! `MemoryStatusStore` backs the tests and is the daemon default.

use async_trait::async_trait;
use ff_core::model::{ConnectionProfileTask, DownloadedFile, StatusLog};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("no such profile: {0}")]
    UnknownProfile(i32),
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Tasks of a connection profile, in execution order
    async fn tasks_for_profile(
        &self,
        profile_id: i32,
    ) -> Result<Vec<ConnectionProfileTask>, StoreError>;

    async fn status_log(&self, device_id: i32) -> Result<Option<StatusLog>, StoreError>;

    /// Replace the device's single status-log row
    async fn upsert_status_log(&self, row: StatusLog) -> Result<(), StoreError>;

    async fn append_downloaded_file(&self, row: DownloadedFile) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryState {
    tasks: HashMap<i32, Vec<ConnectionProfileTask>>,
    status_logs: HashMap<i32, StatusLog>,
    downloaded: Vec<DownloadedFile>,
    fail_writes: bool,
}

/// In-memory store, also used as the test fake
#[derive(Clone, Default)]
pub struct MemoryStatusStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_tasks(&self, profile_id: i32, tasks: Vec<ConnectionProfileTask>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.tasks.insert(profile_id, tasks);
    }

    /// Make every write fail, for exercising the warning path
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).fail_writes = fail;
    }

    pub fn downloaded_files(&self) -> Vec<DownloadedFile> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .downloaded
            .clone()
    }

    pub fn status_log_row(&self, device_id: i32) -> Option<StatusLog> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .status_logs
            .get(&device_id)
            .cloned()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn tasks_for_profile(
        &self,
        profile_id: i32,
    ) -> Result<Vec<ConnectionProfileTask>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .tasks
            .get(&profile_id)
            .cloned()
            .ok_or(StoreError::UnknownProfile(profile_id))
    }

    async fn status_log(&self, device_id: i32) -> Result<Option<StatusLog>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.status_logs.get(&device_id).cloned())
    }

    async fn upsert_status_log(&self, row: StatusLog) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.fail_writes {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        state.status_logs.insert(row.device_id, row);
        Ok(())
    }

    async fn append_downloaded_file(&self, row: DownloadedFile) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.fail_writes {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        state.downloaded.push(row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: i32) -> ConnectionProfileTask {
        ConnectionProfileTask {
            id,
            profile_id: 1,
            name: format!("task-{id}"),
            settings: String::new(),
        }
    }

    #[tokio::test]
    async fn tasks_round_trip() {
        let store = MemoryStatusStore::new();
        store.put_tasks(1, vec![task(10), task(11)]);

        let tasks = store.tasks_for_profile(1).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(store.tasks_for_profile(2).await.is_err());
    }

    #[tokio::test]
    async fn upsert_replaces_the_single_row() {
        let store = MemoryStatusStore::new();

        let mut row = StatusLog {
            device_id: 7,
            ..StatusLog::default()
        };
        row.last_file = Some("a.dat".to_string());
        store.upsert_status_log(row.clone()).await.unwrap();

        row.last_file = Some("b.dat".to_string());
        store.upsert_status_log(row).await.unwrap();

        let stored = store.status_log_row(7).unwrap();
        assert_eq!(stored.last_file.as_deref(), Some("b.dat"));
    }

    #[tokio::test]
    async fn injected_write_failures() {
        let store = MemoryStatusStore::new();
        store.fail_writes(true);
        let result = store.upsert_status_log(StatusLog::default()).await;
        assert!(result.is_err());
    }
}
