// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory remote filesystem with call recording for tests

use super::remote::{RemoteConnector, RemoteEntry, RemoteError, RemoteSession};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use ff_core::settings::ConnectionSettings;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Recorded call to the fake remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Connect { host: String },
    List { path: String },
    Download { path: String },
    Remove { path: String },
    Close,
}

#[derive(Debug, Clone)]
struct FakeFile {
    name: String,
    size: u64,
    modified: NaiveDateTime,
}

#[derive(Default)]
struct FakeState {
    /// directory path -> files in it
    dirs: BTreeMap<String, Vec<FakeFile>>,
    calls: Vec<RemoteCall>,
    fail_connect: bool,
    fail_list: BTreeSet<String>,
    fail_download: BTreeSet<String>,
    fail_remove: BTreeSet<String>,
    connect_delay: Option<Duration>,
    download_count: u64,
    /// Invoked synchronously after each successful download with the
    /// running count; lets tests cancel or fail at an exact point.
    download_hook: Option<Arc<dyn Fn(u64) + Send + Sync>>,
}

/// Fake remote endpoint: connector and content store in one handle
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a directory (and its ancestors) so listings see it
    pub fn add_dir(&self, path: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = join(if current.is_empty() { "/" } else { &current }, part);
            state.dirs.entry(current.clone()).or_default();
        }
        state.dirs.entry("/".to_string()).or_default();
    }

    pub fn add_file(&self, dir: &str, name: &str, size: u64, modified: NaiveDateTime) {
        self.add_dir(dir);
        let key = match dir.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .dirs
            .entry(key.to_string())
            .or_default()
            .push(FakeFile {
                name: name.to_string(),
                size,
                modified,
            });
    }

    pub fn remove_file(&self, dir: &str, name: &str) {
        let key = match dir.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(files) = state.dirs.get_mut(key) {
            files.retain(|f| f.name != name);
        }
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).fail_connect = fail;
    }

    pub fn fail_list(&self, path: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.fail_list.insert(path.to_string());
    }

    pub fn fail_download(&self, path: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.fail_download.insert(path.to_string());
    }

    pub fn fail_remove(&self, path: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.fail_remove.insert(path.to_string());
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).connect_delay = Some(delay);
    }

    /// Run `hook` after every successful download with the running
    /// download count (1-based)
    pub fn on_download(&self, hook: impl Fn(u64) + Send + Sync + 'static) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).download_hook = Some(Arc::new(hook));
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).calls.clone()
    }

    /// Paths passed to `download`, in order
    pub fn downloads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::Download { path } => Some(path),
                _ => None,
            })
            .collect()
    }

    /// True while the file is still present on the fake remote
    pub fn has_file(&self, dir: &str, name: &str) -> bool {
        let key = match dir.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .dirs
            .get(key)
            .is_some_and(|files| files.iter().any(|f| f.name == name))
    }
}

#[async_trait]
impl RemoteConnector for FakeRemote {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let (fail, delay) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.calls.push(RemoteCall::Connect {
                host: settings.host_name.clone(),
            });
            (state.fail_connect, state.connect_delay)
        };

        if let Some(delay) = delay {
            if delay >= timeout {
                return Err(RemoteError::ConnectTimeout {
                    host: settings.host_name.clone(),
                    timeout,
                });
            }
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(RemoteError::Connect {
                host: settings.host_name.clone(),
                message: "connection refused".to_string(),
            });
        }

        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(RemoteCall::List {
            path: path.to_string(),
        });

        if state.fail_list.contains(path) {
            return Err(RemoteError::List {
                path: path.to_string(),
                message: "permission denied".to_string(),
            });
        }

        let dir = path.trim_end_matches('/');
        let dir_key = if dir.is_empty() { "/" } else { dir };
        let Some(files) = state.dirs.get(dir_key) else {
            return Err(RemoteError::List {
                path: path.to_string(),
                message: "no such directory".to_string(),
            });
        };

        let mut entries: Vec<RemoteEntry> = files
            .iter()
            .map(|f| RemoteEntry {
                name: f.name.clone(),
                path: join(dir_key, &f.name),
                size: f.size,
                modified: f.modified,
                is_dir: false,
            })
            .collect();

        // Immediate child directories
        let prefix = if dir_key == "/" {
            "/".to_string()
        } else {
            format!("{dir_key}/")
        };
        for candidate in state.dirs.keys() {
            if candidate == dir_key {
                continue;
            }
            if let Some(rest) = candidate.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    entries.push(RemoteEntry {
                        name: rest.to_string(),
                        path: candidate.clone(),
                        size: 0,
                        modified: NaiveDateTime::default(),
                        is_dir: true,
                    });
                }
            }
        }

        Ok(entries)
    }

    async fn download(&mut self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        let size = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.calls.push(RemoteCall::Download {
                path: remote.to_string(),
            });

            if state.fail_download.contains(remote) {
                return Err(RemoteError::Download {
                    path: remote.to_string(),
                    message: "transfer aborted".to_string(),
                });
            }

            let (dir, name) = remote.rsplit_once('/').unwrap_or(("/", remote));
            let dir_key = if dir.is_empty() { "/" } else { dir };
            let found = state
                .dirs
                .get(dir_key)
                .and_then(|files| files.iter().find(|f| f.name == name))
                .map(|f| f.size);
            match found {
                Some(size) => size,
                None => {
                    return Err(RemoteError::Download {
                        path: remote.to_string(),
                        message: "no such file".to_string(),
                    })
                }
            }
        };

        tokio::fs::write(local, vec![b'x'; size as usize]).await?;

        let hook = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.download_count += 1;
            state
                .download_hook
                .clone()
                .map(|hook| (hook, state.download_count))
        };
        if let Some((hook, count)) = hook {
            hook(count);
        }
        Ok(())
    }

    async fn remove(&mut self, remote: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(RemoteCall::Remove {
            path: remote.to_string(),
        });

        if state.fail_remove.contains(remote) {
            return Err(RemoteError::Remove {
                path: remote.to_string(),
                message: "permission denied".to_string(),
            });
        }

        let (dir, name) = remote.rsplit_once('/').unwrap_or(("/", remote));
        let dir_key = if dir.is_empty() { "/" } else { dir };
        if let Some(files) = state.dirs.get_mut(dir_key) {
            files.retain(|f| f.name != name);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(RemoteCall::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn mtime() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap()
    }

    async fn session(remote: &FakeRemote) -> Box<dyn RemoteSession> {
        remote
            .connect(&ConnectionSettings::default(), Duration::from_secs(5))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn lists_files_and_child_directories() {
        let remote = FakeRemote::new();
        remote.add_file("/data", "a.dat", 100, mtime());
        remote.add_dir("/data/sub");

        let mut s = session(&remote).await;
        let entries = s.list("/data").await.unwrap();

        let names: Vec<(&str, bool)> = entries
            .iter()
            .map(|e| (e.name.as_str(), e.is_dir))
            .collect();
        assert!(names.contains(&("a.dat", false)));
        assert!(names.contains(&("sub", true)));
    }

    #[tokio::test]
    async fn download_writes_sized_file_and_records_call() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeRemote::new();
        remote.add_file("/data", "a.dat", 100, mtime());

        let mut s = session(&remote).await;
        let local = dir.path().join("a.dat");
        s.download("/data/a.dat", &local).await.unwrap();

        assert_eq!(std::fs::metadata(&local).unwrap().len(), 100);
        assert_eq!(remote.downloads(), vec!["/data/a.dat"]);
    }

    #[tokio::test]
    async fn remove_deletes_the_file() {
        let remote = FakeRemote::new();
        remote.add_file("/data", "a.dat", 100, mtime());

        let mut s = session(&remote).await;
        s.remove("/data/a.dat").await.unwrap();
        assert!(!remote.has_file("/data", "a.dat"));
    }

    #[tokio::test]
    async fn injected_failures_surface() {
        let remote = FakeRemote::new();
        remote.add_file("/data", "a.dat", 100, mtime());
        remote.fail_list("/data");
        remote.fail_connect(true);

        let err = remote
            .connect(&ConnectionSettings::default(), Duration::from_secs(5))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RemoteError::Connect { .. }));

        remote.fail_connect(false);
        let mut s = session(&remote).await;
        assert!(s.list("/data").await.is_err());
    }

    #[tokio::test]
    async fn slow_connect_times_out() {
        let remote = FakeRemote::new();
        remote.set_connect_delay(Duration::from_secs(60));

        let err = remote
            .connect(&ConnectionSettings::default(), Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RemoteError::ConnectTimeout { .. }));
    }
}
