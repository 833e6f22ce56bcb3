// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed views over the opaque `key=value; key=value` settings strings
//! carried by devices and connection-profile tasks
//!
//! Keys are case-insensitive; unknown keys are ignored so old rows keep
//! parsing after fields are retired. A malformed value is fatal to the
//! owning runner's initialization.

use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("malformed settings entry {entry:?}: expected key=value")]
    MalformedEntry { entry: String },
    #[error("invalid value {value:?} for {key}")]
    BadValue { key: &'static str, value: String },
}

/// Split a `key=value; key=value` settings string into lowercase keys.
///
/// Values keep their case; `=` inside a value is preserved.
fn parse_pairs(raw: &str) -> Result<HashMap<String, String>, SettingsError> {
    let mut pairs = HashMap::new();
    for entry in raw.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((key, value)) = entry.split_once('=') else {
            return Err(SettingsError::MalformedEntry {
                entry: entry.to_string(),
            });
        };
        pairs.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(pairs)
}

fn parse_bool(
    pairs: &HashMap<String, String>,
    key: &'static str,
    default: bool,
) -> Result<bool, SettingsError> {
    match pairs.get(&key.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(SettingsError::BadValue {
                key,
                value: v.clone(),
            }),
        },
    }
}

fn parse_num<T: std::str::FromStr>(
    pairs: &HashMap<String, String>,
    key: &'static str,
    default: T,
) -> Result<T, SettingsError> {
    match pairs.get(&key.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| SettingsError::BadValue {
            key,
            value: v.clone(),
        }),
    }
}

fn parse_string(pairs: &HashMap<String, String>, key: &str, default: &str) -> String {
    pairs
        .get(&key.to_ascii_lowercase())
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

/// Per-task transfer options
#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub file_extensions: String,
    pub remote_path: String,
    pub local_path: String,
    pub recursive_download: bool,
    pub delete_remote_files_after_download: bool,
    pub limit_remote_file_download_by_age: bool,
    pub delete_old_local_files: bool,
    pub skip_download_if_unchanged: bool,
    pub overwrite_existing_local_files: bool,
    pub archive_existing_files_before_download: bool,
    pub synchronize_timestamps: bool,
    /// Megabytes, base-1000
    pub maximum_file_size: f64,
    /// -1 means unlimited
    pub maximum_file_count: i64,
    pub directory_naming_expression: String,
    /// Non-empty replaces the FTP transfer with an external command
    pub external_operation: String,
    /// Inactivity timeout for the external command
    pub external_operation_timeout: Duration,
    /// `domain\user` credentials for UNC local paths
    pub directory_auth_user_name: String,
    pub directory_auth_password: String,
    pub email_on_file_update: bool,
    pub email_recipients: String,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            file_extensions: "*.*".to_string(),
            remote_path: "/".to_string(),
            local_path: String::new(),
            recursive_download: false,
            delete_remote_files_after_download: false,
            limit_remote_file_download_by_age: false,
            delete_old_local_files: false,
            skip_download_if_unchanged: false,
            overwrite_existing_local_files: false,
            archive_existing_files_before_download: false,
            synchronize_timestamps: false,
            maximum_file_size: 8.0,
            maximum_file_count: -1,
            directory_naming_expression: "<YYYY><MM>\\<DeviceFolderName>".to_string(),
            external_operation: String::new(),
            external_operation_timeout: Duration::from_secs(300),
            directory_auth_user_name: String::new(),
            directory_auth_password: String::new(),
            email_on_file_update: false,
            email_recipients: String::new(),
        }
    }
}

impl TaskSettings {
    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        let pairs = parse_pairs(raw)?;
        let defaults = Self::default();

        let timeout_secs = parse_num(
            &pairs,
            "externalOperationTimeout",
            defaults.external_operation_timeout.as_secs(),
        )?;

        Ok(Self {
            file_extensions: parse_string(&pairs, "fileExtensions", &defaults.file_extensions),
            remote_path: parse_string(&pairs, "remotePath", &defaults.remote_path),
            local_path: parse_string(&pairs, "localPath", ""),
            recursive_download: parse_bool(&pairs, "recursiveDownload", false)?,
            delete_remote_files_after_download: parse_bool(
                &pairs,
                "deleteRemoteFilesAfterDownload",
                false,
            )?,
            limit_remote_file_download_by_age: parse_bool(
                &pairs,
                "limitRemoteFileDownloadByAge",
                false,
            )?,
            delete_old_local_files: parse_bool(&pairs, "deleteOldLocalFiles", false)?,
            skip_download_if_unchanged: parse_bool(&pairs, "skipDownloadIfUnchanged", false)?,
            overwrite_existing_local_files: parse_bool(
                &pairs,
                "overwriteExistingLocalFiles",
                false,
            )?,
            archive_existing_files_before_download: parse_bool(
                &pairs,
                "archiveExistingFilesBeforeDownload",
                false,
            )?,
            synchronize_timestamps: parse_bool(&pairs, "synchronizeTimestamps", false)?,
            maximum_file_size: parse_num(&pairs, "maximumFileSize", defaults.maximum_file_size)?,
            maximum_file_count: parse_num(&pairs, "maximumFileCount", -1)?,
            directory_naming_expression: parse_string(
                &pairs,
                "directoryNamingExpression",
                &defaults.directory_naming_expression,
            ),
            external_operation: parse_string(&pairs, "externalOperation", ""),
            external_operation_timeout: Duration::from_secs(timeout_secs),
            directory_auth_user_name: parse_string(&pairs, "directoryAuthUserName", ""),
            directory_auth_password: parse_string(&pairs, "directoryAuthPassword", ""),
            email_on_file_update: parse_bool(&pairs, "emailOnFileUpdate", false)?,
            email_recipients: parse_string(&pairs, "emailRecipients", ""),
        })
    }

    /// Comma-split wildcard patterns derived from `file_extensions`
    pub fn file_specs(&self) -> Vec<String> {
        self.file_extensions
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    /// Size cap in bytes, base-1000 megabytes
    pub fn maximum_file_size_bytes(&self) -> u64 {
        (self.maximum_file_size * 1_000_000.0) as u64
    }

    /// True when this task runs an external command instead of FTP
    pub fn is_external(&self) -> bool {
        !self.external_operation.trim().is_empty()
    }

    pub fn email_recipient_list(&self) -> Vec<String> {
        self.email_recipients
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }
}

/// Device connection options parsed from the device connection string
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    pub host_name: String,
    pub port: u16,
    pub user_name: String,
    pub password: String,
    pub use_dial_up: bool,
    pub dial_up_entry_name: String,
    pub dial_up_number: String,
    pub dial_up_user_name: String,
    pub dial_up_password: String,
}

impl ConnectionSettings {
    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        let pairs = parse_pairs(raw)?;

        Ok(Self {
            host_name: parse_string(&pairs, "hostName", ""),
            port: parse_num(&pairs, "port", 21)?,
            user_name: parse_string(&pairs, "userName", "anonymous"),
            password: parse_string(&pairs, "password", ""),
            use_dial_up: parse_bool(&pairs, "useDialUp", false)?,
            dial_up_entry_name: parse_string(&pairs, "dialUpEntryName", ""),
            dial_up_number: parse_string(&pairs, "dialUpNumber", ""),
            dial_up_user_name: parse_string(&pairs, "dialUpUserName", ""),
            dial_up_password: parse_string(&pairs, "dialUpPassword", ""),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[test]
    fn empty_string_yields_defaults() {
        let s = TaskSettings::parse("").unwrap();
        assert_eq!(s.file_extensions, "*.*");
        assert_eq!(s.directory_naming_expression, "<YYYY><MM>\\<DeviceFolderName>");
        assert_eq!(s.maximum_file_count, -1);
        assert!(!s.recursive_download);
        assert!(!s.is_external());
    }

    #[test]
    fn keys_are_case_insensitive() {
        let s = TaskSettings::parse("RECURSIVEDOWNLOAD=true; fileextensions=*.dat").unwrap();
        assert!(s.recursive_download);
        assert_eq!(s.file_extensions, "*.dat");
    }

    #[test]
    fn file_specs_split_and_trim() {
        let s = TaskSettings::parse("fileExtensions=*.dat, *.cfg ,,*.rcd").unwrap();
        assert_eq!(s.file_specs(), vec!["*.dat", "*.cfg", "*.rcd"]);
    }

    #[test]
    fn maximum_file_size_is_base_1000() {
        let s = TaskSettings::parse("maximumFileSize=2.5").unwrap();
        assert_eq!(s.maximum_file_size_bytes(), 2_500_000);
    }

    #[test]
    fn external_operation_detected() {
        let s = TaskSettings::parse(
            "externalOperation=fetch.sh <DeviceAcronym>; externalOperationTimeout=5",
        )
        .unwrap();
        assert!(s.is_external());
        assert_eq!(s.external_operation_timeout, Duration::from_secs(5));
    }

    #[parameterized(
        bad_bool = { "recursiveDownload=perhaps" },
        bad_count = { "maximumFileCount=lots" },
        bad_size = { "maximumFileSize=big" },
        missing_equals = { "recursiveDownload" },
    )]
    fn malformed_values_are_errors(raw: &str) {
        assert!(TaskSettings::parse(raw).is_err());
    }

    #[test]
    fn connection_settings_defaults_and_overrides() {
        let c = ConnectionSettings::parse(
            "hostName=meter-7.example.net; port=2121; userName=poll; password=s3cret",
        )
        .unwrap();
        assert_eq!(c.host_name, "meter-7.example.net");
        assert_eq!(c.port, 2121);
        assert!(!c.use_dial_up);

        let d = ConnectionSettings::parse("useDialUp=true; dialUpEntryName=M1").unwrap();
        assert!(d.use_dial_up);
        assert_eq!(d.dial_up_entry_name, "M1");
        assert_eq!(d.port, 21);
    }

    #[test]
    fn email_recipients_split() {
        let s = TaskSettings::parse(
            "emailOnFileUpdate=true; emailRecipients=ops@example.com, oncall@example.com",
        )
        .unwrap();
        assert_eq!(
            s.email_recipient_list(),
            vec!["ops@example.com", "oncall@example.com"]
        );
    }
}
