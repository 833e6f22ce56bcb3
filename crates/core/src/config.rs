// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global engine configuration loaded from TOML

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Process-wide settings shared by every device runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Size of the shared FTP worker pool; 0 disables pooling and gives
    /// each runner a private worker
    pub ftp_thread_count: usize,
    /// Files-per-window alert threshold; 0 disables the guard
    pub max_download_threshold: u64,
    #[serde(with = "humantime_serde")]
    pub max_download_threshold_window: Duration,
    /// File extensions whose successful downloads update the status log
    pub status_log_inclusions: Vec<String>,
    /// File-name prefixes excluded from status-log updates
    pub status_log_exclusions: Vec<String>,
    /// Remote files older than this many days are skipped when the task
    /// enables the age filter
    pub max_remote_file_age: i64,
    /// Local files older than this many days are purged when the task
    /// enables the local age purge
    pub max_local_file_age: i64,
    pub default_local_path: PathBuf,
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub dial_up_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ftp_thread_count: 20,
            max_download_threshold: 0,
            max_download_threshold_window: Duration::from_secs(24 * 3600),
            status_log_inclusions: [".rcd", ".d00", ".dat", ".ctl", ".cfg", ".pcd"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            status_log_exclusions: ["rms.", "trend."].iter().map(|s| s.to_string()).collect(),
            max_remote_file_age: 30,
            max_local_file_age: 365,
            default_local_path: PathBuf::from("downloads"),
            connection_timeout: Duration::from_secs(30),
            dial_up_timeout: Duration::from_secs(90),
        }
    }
}

impl Config {
    /// Load configuration from disk, writing the defaults if the file
    /// does not exist yet.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let cfg = Config::default();
            let rendered =
                toml::to_string_pretty(&cfg).expect("default config always serializes");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(path, rendered).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!(path = %path.display(), "created default config");
            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.ftp_thread_count, 20);
        assert_eq!(cfg.max_remote_file_age, 30);
        assert_eq!(
            cfg.status_log_inclusions,
            vec![".rcd", ".d00", ".dat", ".ctl", ".cfg", ".pcd"]
        );
        assert_eq!(cfg.status_log_exclusions, vec!["rms.", "trend."]);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg: Config = toml::from_str("ftp-thread-count = 4\n").unwrap();
        assert_eq!(cfg.ftp_thread_count, 4);
        assert_eq!(cfg.max_remote_file_age, 30);
    }

    #[test]
    fn load_or_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ff.toml");

        let first = Config::load_or_init(&path).unwrap();
        assert!(path.exists());

        let second = Config::load_or_init(&path).unwrap();
        assert_eq!(first.ftp_thread_count, second.ftp_thread_count);
    }

    #[test]
    fn durations_round_trip_as_humantime() {
        let cfg = Config::default();
        let rendered = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.connection_timeout, cfg.connection_timeout);
        assert_eq!(
            parsed.max_download_threshold_window,
            cfg.max_download_threshold_window
        );
    }
}
