// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local filesystem operations around a transfer
//!
//! Archiving moves the previous copy into an `Archive/` sub-folder with
//! ` (n)` collision suffixes. Purging removes top-level files older
//! than the configured whole-day age. Timestamp sync copies the remote
//! modification time onto the local file.

use chrono::{Local, NaiveDateTime, TimeZone};
use std::fs::FileTimes;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const ARCHIVE_DIR: &str = "Archive";

/// First free path for `name` inside `dir`, inserting ` (n)` before the
/// extension on collision.
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    for n in 1.. {
        let suffixed = match extension {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(suffixed);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("some suffix is always free");
}

/// Move an existing local file into `<parent>/Archive/`, resolving name
/// collisions. Returns the archived path.
pub fn archive_existing(path: &Path) -> io::Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("file has no parent directory"))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::other("file has no usable name"))?;

    let archive_dir = parent.join(ARCHIVE_DIR);
    std::fs::create_dir_all(&archive_dir)?;

    let target = unique_path(&archive_dir, name);
    std::fs::rename(path, &target)?;
    Ok(target)
}

/// Whole days between `then` and `now`, floored; negative when `then`
/// is in the future.
pub fn whole_days_old(now: NaiveDateTime, then: NaiveDateTime) -> i64 {
    (now - then).num_days()
}

/// Delete top-level files in `dir` older than `max_age_days`. Returns
/// how many were removed; individual failures are logged and skipped.
pub fn purge_old_files(dir: &Path, max_age_days: i64, now: NaiveDateTime) -> io::Result<u64> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(error) => {
                tracing::warn!(%error, "unreadable directory entry during purge");
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(system_time_to_naive_local);
        let Ok(modified) = modified else {
            continue;
        };

        if whole_days_old(now, modified) > max_age_days {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "failed to purge old file");
                }
            }
        }
    }
    Ok(removed)
}

/// Set the local file's mtime and atime to the remote timestamp
pub fn sync_file_times(path: &Path, remote: NaiveDateTime) -> io::Result<()> {
    let time = naive_local_to_system_time(remote);
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(FileTimes::new().set_accessed(time).set_modified(time))
}

pub fn system_time_to_naive_local(time: SystemTime) -> NaiveDateTime {
    chrono::DateTime::<Local>::from(time).naive_local()
}

pub fn naive_local_to_system_time(naive: NaiveDateTime) -> SystemTime {
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive));
    SystemTime::from(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn unique_path_appends_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.dat"), b"x").unwrap();
        std::fs::write(dir.path().join("a (1).dat"), b"x").unwrap();

        let free = unique_path(dir.path(), "a.dat");
        assert_eq!(free.file_name().unwrap(), "a (2).dat");

        let fresh = unique_path(dir.path(), "b.dat");
        assert_eq!(fresh.file_name().unwrap(), "b.dat");
    }

    #[test]
    fn unique_path_handles_extensionless_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README"), b"x").unwrap();
        let free = unique_path(dir.path(), "README");
        assert_eq!(free.file_name().unwrap(), "README (1)");
    }

    #[test]
    fn archive_moves_into_archive_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("event.dat");
        std::fs::write(&file, b"previous").unwrap();

        let archived = archive_existing(&file).unwrap();

        assert!(!file.exists());
        assert_eq!(archived, dir.path().join(ARCHIVE_DIR).join("event.dat"));
        assert_eq!(std::fs::read(&archived).unwrap(), b"previous");
    }

    #[test]
    fn archive_resolves_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("event.dat");

        std::fs::write(&file, b"first").unwrap();
        archive_existing(&file).unwrap();
        std::fs::write(&file, b"second").unwrap();
        let second = archive_existing(&file).unwrap();

        assert_eq!(second.file_name().unwrap(), "event (1).dat");
    }

    #[test]
    fn whole_days_floor() {
        let now = noon(10);
        assert_eq!(whole_days_old(now, noon(9)), 1);
        // 23 hours is zero whole days
        assert_eq!(
            whole_days_old(now, noon(9) + chrono::Duration::hours(1)),
            0
        );
        assert_eq!(whole_days_old(now, noon(11)), -1);
    }

    #[test]
    fn purge_removes_only_old_top_level_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.dat");
        let fresh = dir.path().join("fresh.dat");
        std::fs::write(&old, b"x").unwrap();
        std::fs::write(&fresh, b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        // Backdate the old file by ten days
        sync_file_times(&old, Local::now().naive_local() - chrono::Duration::days(10)).unwrap();

        let removed =
            purge_old_files(dir.path(), 5, Local::now().naive_local()).unwrap();

        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(dir.path().join("sub").exists());
    }

    #[test]
    fn sync_file_times_round_trips_to_the_second() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.dat");
        std::fs::write(&file, b"x").unwrap();

        let stamp = noon(1);
        sync_file_times(&file, stamp).unwrap();

        let read_back =
            system_time_to_naive_local(std::fs::metadata(&file).unwrap().modified().unwrap());
        assert_eq!(read_back.and_utc().timestamp(), stamp.and_utc().timestamp());
    }
}
