// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet file: the devices, profiles, tasks, and schedules this daemon
//! manages, loaded from TOML at startup

use ff_core::model::{ConnectionProfile, ConnectionProfileTask, Device};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("failed to read fleet file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse fleet file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("device {device} references unknown profile {profile}")]
    UnknownProfile { device: String, profile: i32 },
}

/// One managed device plus its schedule and profile binding
#[derive(Debug, Clone, Deserialize)]
pub struct FleetDevice {
    #[serde(flatten)]
    pub device: Device,
    pub profile: i32,
    /// Five-field cron expression
    pub schedule: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FleetFile {
    #[serde(default)]
    pub devices: Vec<FleetDevice>,
    #[serde(default)]
    pub profiles: Vec<ConnectionProfile>,
    #[serde(default)]
    pub tasks: Vec<ConnectionProfileTask>,
}

impl FleetFile {
    pub fn load(path: &Path) -> Result<Self, FleetError> {
        let data = std::fs::read_to_string(path).map_err(|source| FleetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let fleet: FleetFile = toml::from_str(&data).map_err(|source| FleetError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fleet.validate()?;
        Ok(fleet)
    }

    fn validate(&self) -> Result<(), FleetError> {
        for entry in &self.devices {
            if !self.profiles.iter().any(|p| p.id == entry.profile) {
                return Err(FleetError::UnknownProfile {
                    device: entry.device.acronym.clone(),
                    profile: entry.profile,
                });
            }
        }
        Ok(())
    }

    pub fn profile(&self, id: i32) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Tasks of one profile, in file order
    pub fn tasks_for(&self, profile_id: i32) -> Vec<ConnectionProfileTask> {
        self.tasks
            .iter()
            .filter(|t| t.profile_id == profile_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[profiles]]
        id = 1
        name = "nightly"

        [[tasks]]
        id = 42
        profile_id = 1
        name = "events"
        settings = "remotePath=/data;fileExtensions=*.dat"

        [[devices]]
        id = 7
        acronym = "SHELBY"
        enabled = true
        connection = "hostName=meter-7.example.net"
        profile = 1
        schedule = "30 3 * * *"
    "#;

    #[test]
    fn parses_a_complete_fleet_file() {
        let fleet: FleetFile = toml::from_str(SAMPLE).unwrap();
        fleet.validate().unwrap();

        assert_eq!(fleet.devices.len(), 1);
        assert_eq!(fleet.devices[0].device.acronym, "SHELBY");
        assert_eq!(fleet.devices[0].schedule, "30 3 * * *");
        assert_eq!(fleet.tasks_for(1).len(), 1);
        assert_eq!(fleet.profile(1).unwrap().name, "nightly");
    }

    #[test]
    fn unknown_profile_reference_is_rejected() {
        let bad = SAMPLE.replace("profile = 1", "profile = 9");
        let fleet: FleetFile = toml::from_str(&bad).unwrap();
        assert!(matches!(
            fleet.validate(),
            Err(FleetError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn sections_default_to_empty() {
        let fleet: FleetFile = toml::from_str("").unwrap();
        assert!(fleet.devices.is_empty());
        assert!(fleet.profiles.is_empty());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FleetFile::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(FleetError::Read { .. })));
    }
}
