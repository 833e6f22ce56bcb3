// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-operation runner: a child process instead of an FTP task
//!
//! The command runs in its own process group with captured stdio. Any
//! stdio output or filesystem event under the working directory resets
//! the inactivity timer; the whole process tree is killed when the
//! cancellation token fires or the timer exceeds the configured
//! timeout. Files that appear in the directory while the command runs
//! are counted as downloads.

use ff_core::cancel::CancelToken;
use ff_core::stats::RuntimeState;
use notify::{RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Wait-loop granularity
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("external operation command is empty")]
    EmptyCommand,
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened to one external operation
#[derive(Debug, Clone)]
pub struct ExternalOutcome {
    /// Exit code when the process exited on its own
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    /// Files that newly appeared in the working directory
    pub new_files: u64,
}

impl ExternalOutcome {
    /// Force-kill (timeout or cancellation) is the only run failure
    pub fn was_killed(&self) -> bool {
        self.timed_out || self.cancelled
    }
}

/// Split a command line into executable and arguments, honoring single
/// and double quotes.
pub fn split_command(command: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in command.chars() {
        match (c, quote) {
            (q @ ('"' | '\''), None) => quote = Some(q),
            (q, Some(open)) if q == open => quote = None,
            (c, None) if c.is_whitespace() => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            (c, _) => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn snapshot_files(dir: &Path) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            if entry.path().is_file() {
                names.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }
    names
}

async fn kill_tree(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child was spawned as its own process group leader, so the
        // negative pid addresses the whole tree.
        let _ = std::process::Command::new("kill")
            .args(["-KILL", &format!("-{pid}")])
            .status();
    }
    let _ = child.start_kill();
}

/// Run the expanded external command with `work_dir` as its working
/// directory, enforcing the inactivity timeout.
pub async fn run_external_operation(
    command: &str,
    work_dir: &Path,
    timeout: Duration,
    cancel: &CancelToken,
    state: &RuntimeState,
) -> Result<ExternalOutcome, ExternalError> {
    let parts = split_command(command);
    let Some((exe, args)) = parts.split_first() else {
        return Err(ExternalError::EmptyCommand);
    };

    std::fs::create_dir_all(work_dir)?;
    let before = snapshot_files(work_dir);

    let mut std_cmd = std::process::Command::new(exe);
    std_cmd
        .args(args)
        .current_dir(work_dir)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_cmd.process_group(0);
    }

    let mut child = tokio::process::Command::from(std_cmd)
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExternalError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let last_update = Arc::new(Mutex::new(Instant::now()));

    // Filesystem activity resets the inactivity timer
    let fs_update = Arc::clone(&last_update);
    let mut watcher =
        notify::recommended_watcher(move |event: Result<notify::Event, notify::Error>| {
            if event.is_ok() {
                *fs_update.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
            }
        })
        .ok();
    if let Some(watcher) = watcher.as_mut() {
        if let Err(error) = watcher.watch(work_dir, RecursiveMode::NonRecursive) {
            tracing::warn!(%error, dir = %work_dir.display(), "directory watch failed");
        }
    }

    // Stdio activity does too
    if let Some(stdout) = child.stdout.take() {
        let stdio_update = Arc::clone(&last_update);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                *stdio_update.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
                tracing::debug!(target: "ff_engine::external", "{line}");
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let stdio_update = Arc::clone(&last_update);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                *stdio_update.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
                tracing::debug!(target: "ff_engine::external", "{line}");
            }
        });
    }

    let mut timed_out = false;
    let mut cancelled = false;
    let status = loop {
        // Child::wait is cancel-safe, so polling it under a timeout is
        // a clean 1 s tick without losing the exit status.
        match tokio::time::timeout(POLL_INTERVAL, child.wait()).await {
            Ok(status) => break status?,
            Err(_tick) => {
                if cancel.is_cancelled() {
                    if !cancelled {
                        cancelled = true;
                        kill_tree(&mut child).await;
                    }
                    continue;
                }
                let idle = last_update
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .elapsed();
                if idle > timeout && !timed_out {
                    timed_out = true;
                    kill_tree(&mut child).await;
                }
            }
        }
    };

    // Count files that appeared while the command ran
    let mut new_files = 0;
    for name in snapshot_files(work_dir).difference(&before) {
        let size = std::fs::metadata(work_dir.join(name))
            .map(|m| m.len())
            .unwrap_or(0);
        state.record_download(size);
        new_files += 1;
    }

    Ok(ExternalOutcome {
        exit_code: if timed_out || cancelled {
            None
        } else {
            status.code()
        },
        timed_out,
        cancelled,
        new_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        plain = { "fetch.sh --all", vec!["fetch.sh", "--all"] },
        extra_spaces = { "  fetch.sh   --all ", vec!["fetch.sh", "--all"] },
        double_quoted = { "cp \"my file.dat\" out", vec!["cp", "my file.dat", "out"] },
        single_quoted = { "sh -c 'sleep 30'", vec!["sh", "-c", "sleep 30"] },
        empty = { "", Vec::<&str>::new() },
    )]
    fn command_splitting(input: &str, expected: Vec<&str>) {
        assert_eq!(split_command(input), expected);
    }

    #[cfg(unix)]
    mod process {
        use super::super::*;
        use ff_core::stats::RuntimeState;

        #[tokio::test]
        async fn completed_command_counts_new_files() {
            let dir = tempfile::tempdir().unwrap();
            let state = RuntimeState::new();
            let cancel = CancelToken::new();

            let outcome = run_external_operation(
                "sh -c 'printf data > pulled.dat'",
                dir.path(),
                Duration::from_secs(30),
                &cancel,
                &state,
            )
            .await
            .unwrap();

            assert_eq!(outcome.exit_code, Some(0));
            assert!(!outcome.was_killed());
            assert_eq!(outcome.new_files, 1);
            assert_eq!(state.files_downloaded(), 1);
        }

        #[tokio::test]
        async fn silent_command_is_killed_on_inactivity() {
            let dir = tempfile::tempdir().unwrap();
            let state = RuntimeState::new();
            let cancel = CancelToken::new();

            let started = Instant::now();
            let outcome = run_external_operation(
                "sleep 60",
                dir.path(),
                Duration::from_millis(200),
                &cancel,
                &state,
            )
            .await
            .unwrap();

            assert!(outcome.timed_out);
            assert!(outcome.was_killed());
            assert!(outcome.exit_code.is_none());
            // One or two poll ticks, far short of the sleep
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn cancellation_kills_the_tree() {
            let dir = tempfile::tempdir().unwrap();
            let state = RuntimeState::new();
            let cancel = CancelToken::new();

            let canceller = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                canceller.cancel();
            });

            let outcome = run_external_operation(
                "sh -c 'sleep 60'",
                dir.path(),
                Duration::from_secs(120),
                &cancel,
                &state,
            )
            .await
            .unwrap();

            assert!(outcome.cancelled);
            assert!(outcome.was_killed());
        }

        #[tokio::test]
        async fn nonzero_exit_is_reported_not_fatal() {
            let dir = tempfile::tempdir().unwrap();
            let state = RuntimeState::new();
            let cancel = CancelToken::new();

            let outcome = run_external_operation(
                "sh -c 'exit 3'",
                dir.path(),
                Duration::from_secs(30),
                &cancel,
                &state,
            )
            .await
            .unwrap();

            assert_eq!(outcome.exit_code, Some(3));
            assert!(!outcome.was_killed());
        }

        #[tokio::test]
        async fn missing_executable_is_a_spawn_error() {
            let dir = tempfile::tempdir().unwrap();
            let state = RuntimeState::new();
            let cancel = CancelToken::new();

            let result = run_external_operation(
                "definitely-not-a-real-binary-ff",
                dir.path(),
                Duration::from_secs(5),
                &cancel,
                &state,
            )
            .await;

            assert!(matches!(result, Err(ExternalError::Spawn { .. })));
        }
    }
}
