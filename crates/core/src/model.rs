// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted row types shared with the status-store collaborator

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A managed device (meter, recorder) identified by its unique acronym
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i32,
    pub acronym: String,
    #[serde(default)]
    pub name: String,
    pub enabled: bool,
    /// Folder-name hint; falls back to the acronym when absent
    #[serde(default)]
    pub original_source: Option<String>,
    /// Opaque connection string, parsed into `ConnectionSettings`
    #[serde(default)]
    pub connection: String,
}

impl Device {
    /// Local folder name for this device's downloads
    pub fn folder_name(&self) -> &str {
        self.original_source.as_deref().unwrap_or(&self.acronym)
    }

    /// Display name, falling back to the acronym
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.acronym
        } else {
            &self.name
        }
    }
}

/// A reusable set of tasks describing what to fetch from a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub id: i32,
    pub name: String,
}

/// One unit of work within a profile; `settings` is the opaque string
/// parsed into `TaskSettings`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfileTask {
    pub id: i32,
    pub profile_id: i32,
    pub name: String,
    #[serde(default)]
    pub settings: String,
}

/// Most-recent-outcome row, one per device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusLog {
    pub device_id: i32,
    pub last_file: Option<String>,
    pub last_success: Option<NaiveDateTime>,
    pub last_failure: Option<NaiveDateTime>,
    pub message: Option<String>,
    pub file_download_timestamp: Option<NaiveDateTime>,
}

/// Append-only record of a successful in-scope download
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub device_id: i32,
    pub creation_time_utc: NaiveDateTime,
    pub file: String,
    pub file_size_kb: u64,
    pub timestamp: NaiveDateTime,
}
