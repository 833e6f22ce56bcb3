// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status recorder: terminal facts about transfers, written through the
//! status-store collaborator
//!
//! Success rows are gated by the configured inclusion/exclusion sets;
//! failure rows are written unconditionally. Writes are serialized by a
//! recorder-level lock, and a store error never reaches the transfer
//! path as anything stronger than a warning.

use chrono::{Local, Utc};
use ff_adapters::status::{StatusStore, StoreError};
use ff_core::model::{DownloadedFile, StatusLog};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Historical divisor carried in the stored rows; deliberately not 1024.
const FILE_SIZE_KB_DIVISOR: u64 = 1028;

pub struct StatusRecorder {
    store: Arc<dyn StatusStore>,
    /// Lowercased extensions (leading dot) whose downloads are in scope
    inclusions: Vec<String>,
    /// Lowercased file-name prefixes that are never in scope
    exclusions: Vec<String>,
    write_lock: Mutex<()>,
}

impl StatusRecorder {
    pub fn new(store: Arc<dyn StatusStore>, inclusions: &[String], exclusions: &[String]) -> Self {
        Self {
            store,
            inclusions: inclusions.iter().map(|s| s.to_ascii_lowercase()).collect(),
            exclusions: exclusions.iter().map(|s| s.to_ascii_lowercase()).collect(),
            write_lock: Mutex::new(()),
        }
    }

    /// Should a successful download of `file_name` update the log?
    pub fn in_scope(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        let extension = lower
            .rfind('.')
            .map(|idx| &lower[idx..])
            .unwrap_or_default();

        self.inclusions.iter().any(|inc| inc == extension)
            && !self.exclusions.iter().any(|exc| lower.starts_with(exc))
    }

    /// Record a successful download. Returns whether the file was in
    /// scope for the status log.
    pub async fn record_success(
        &self,
        device_id: i32,
        file_name: &str,
        size_bytes: u64,
    ) -> Result<bool, StoreError> {
        if !self.in_scope(file_name) {
            return Ok(false);
        }

        let _guard = self.write_lock.lock().await;
        let now = Local::now().naive_local();

        let mut row = self
            .store
            .status_log(device_id)
            .await?
            .unwrap_or(StatusLog {
                device_id,
                ..StatusLog::default()
            });
        row.last_file = Some(file_name.to_string());
        row.last_success = Some(now);
        row.file_download_timestamp = Some(now);
        row.message = None;
        self.store.upsert_status_log(row).await?;

        self.store
            .append_downloaded_file(DownloadedFile {
                device_id,
                creation_time_utc: Utc::now().naive_utc(),
                file: file_name.to_string(),
                file_size_kb: size_bytes / FILE_SIZE_KB_DIVISOR,
                timestamp: now,
            })
            .await?;

        Ok(true)
    }

    /// Record a failure; unconditional, any file
    pub async fn record_failure(
        &self,
        device_id: i32,
        file_name: Option<&str>,
        message: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let now = Local::now().naive_local();

        let mut row = self
            .store
            .status_log(device_id)
            .await?
            .unwrap_or(StatusLog {
                device_id,
                ..StatusLog::default()
            });
        if let Some(file_name) = file_name {
            row.last_file = Some(file_name.to_string());
        }
        row.last_failure = Some(now);
        row.message = Some(message.to_string());
        self.store.upsert_status_log(row).await
    }
}
