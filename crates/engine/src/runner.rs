// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device runner: one profile execution end-to-end for one device
//!
//! The execution strategy is chosen once, at registration: dial-up
//! devices share the thread pinned to their modem entry, everything
//! else gets a pooled thread (or a private one when pooling is off).
//! Triggers funnel through a run-once wrapper so storms coalesce, and
//! a manual trigger on a dial-up device enqueues at High priority.

use crate::external::run_external_operation;
use crate::recorder::StatusRecorder;
use crate::transfer::{resolve_local_base, template_context, TaskRun};
use crate::{localfs, service};
use ff_adapters::dialup::DialUpPort;
use ff_adapters::mailer::Mailer;
use ff_adapters::remote::{RemoteConnector, RemoteSession};
use ff_adapters::auth::ShareAuth;
use ff_adapters::status::StatusStore;
use ff_core::cancel::CancelToken;
use ff_core::clock::Clock;
use ff_core::config::Config;
use ff_core::exec::{Priority, ResourceThreads, RunOnce, ThreadPool};
use ff_core::model::{ConnectionProfile, ConnectionProfileTask, Device};
use ff_core::progress::{DeviceProgress, ProgressBus, ProgressState, ProgressUpdate};
use ff_core::settings::{ConnectionSettings, SettingsError, TaskSettings};
use ff_core::stats::{DeviceStatistics, RuntimeState};
use ff_core::template::expand;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("bad connection string for {device}: {source}")]
    BadConnection {
        device: String,
        source: SettingsError,
    },
}

/// Shared collaborators handed to every runner
pub struct EngineDeps<C: Clock> {
    pub config: Config,
    pub connector: Arc<dyn RemoteConnector>,
    pub dial_up: Arc<dyn DialUpPort>,
    pub store: Arc<dyn StatusStore>,
    pub recorder: Arc<StatusRecorder>,
    pub mailer: Arc<dyn Mailer>,
    pub share_auth: Arc<dyn ShareAuth>,
    pub bus: ProgressBus,
    pub clock: C,
}

pub(crate) struct RunnerCore<C: Clock> {
    pub(crate) device: Device,
    pub(crate) profile: ConnectionProfile,
    connection: ConnectionSettings,
    pub(crate) state: Arc<RuntimeState>,
    cancel: CancelToken,
    deps: Arc<EngineDeps<C>>,
    /// (completion instant, files downloaded) per recent run
    download_window: Mutex<VecDeque<(Instant, u64)>>,
    last_threshold_alert: Mutex<Option<Instant>>,
}

/// Handle owned by the fleet service
pub struct DeviceRunner<C: Clock> {
    core: Arc<RunnerCore<C>>,
    run_once: RunOnce,
    uses_dial_up: bool,
}

impl<C: Clock> DeviceRunner<C> {
    /// Build a runner and pin it to its execution thread. A bad
    /// connection string is fatal: the device stays unregistered until
    /// the next reload.
    pub fn register(
        device: Device,
        profile: ConnectionProfile,
        deps: Arc<EngineDeps<C>>,
        pool: &ThreadPool,
        resources: &ResourceThreads,
        cancel: CancelToken,
    ) -> Result<Self, RunnerError> {
        let connection =
            ConnectionSettings::parse(&device.connection).map_err(|source| {
                RunnerError::BadConnection {
                    device: device.acronym.clone(),
                    source,
                }
            })?;

        let uses_dial_up = connection.use_dial_up;
        let thread = if uses_dial_up {
            resources.get_or_add(&connection.dial_up_entry_name)
        } else {
            pool.create_thread()
        };

        let core = Arc::new(RunnerCore {
            device,
            profile,
            connection,
            state: Arc::new(RuntimeState::new()),
            cancel,
            deps,
            download_window: Mutex::new(VecDeque::new()),
            last_threshold_alert: Mutex::new(None),
        });

        let op_core = Arc::clone(&core);
        let run_once = RunOnce::new(thread, core.device.acronym.clone(), move || {
            let core = Arc::clone(&op_core);
            Box::pin(async move {
                core.execute_run().await;
                Ok(())
            })
        });

        Ok(Self {
            core,
            run_once,
            uses_dial_up,
        })
    }

    /// Schedule-driven trigger; coalesces with any pending run
    pub fn trigger(&self) {
        self.prepare_trigger(false);
        self.run_once.trigger();
    }

    /// Manual trigger ("run now")
    pub fn trigger_manual(&self) {
        self.prepare_trigger(true);
        self.run_once.trigger();
    }

    /// Manual trigger that waits for the resulting run to finish
    pub async fn run_now(&self) {
        self.prepare_trigger(true);
        self.run_once.run_to_completion().await;
    }

    fn prepare_trigger(&self, manual: bool) {
        if self.uses_dial_up {
            self.run_once.set_priority(if manual {
                Priority::High
            } else {
                Priority::Normal
            });
        }
        if manual {
            // Manual triggers pre-count a connection attempt before mode
            // dispatch; on dial-up runs the session open counts it again.
            self.core.state.inc_attempted_connections();
        }
    }

    pub fn device(&self) -> &Device {
        &self.core.device
    }

    pub fn state(&self) -> &Arc<RuntimeState> {
        &self.core.state
    }

    pub fn statistics(&self) -> DeviceStatistics {
        self.core.state.snapshot(self.core.device.enabled)
    }

    pub fn completed_runs(&self) -> u64 {
        self.run_once.completed_runs()
    }
}

impl<C: Clock> RunnerCore<C> {
    fn emit(&self, update: ProgressUpdate) {
        self.deps
            .bus
            .broadcast(DeviceProgress::one(self.device.acronym.clone(), update));
    }

    fn warn(&self, message: String) {
        tracing::warn!(device = %self.device.acronym, "{message}");
        self.emit(ProgressUpdate::new(ProgressState::Failed, message));
    }

    /// One full run: dial, connect, tasks, bookkeeping, terminal events
    pub(crate) async fn execute_run(&self) {
        if self.cancel.is_cancelled() {
            return;
        }

        self.state.begin_run(self.deps.clock.wall());
        tracing::info!(device = %self.device.acronym, profile = %self.profile.name, "run started");

        let tasks = match self.deps.store.tasks_for_profile(self.profile.id).await {
            Ok(tasks) => tasks,
            Err(error) => {
                self.warn(format!("failed to load profile tasks: {error}"));
                self.emit(ProgressUpdate::new(ProgressState::Finished, "run ended"));
                self.state.end_run();
                return;
            }
        };

        // Split into FTP and external-operation sub-lists
        let mut ftp: Vec<(ConnectionProfileTask, TaskSettings)> = Vec::new();
        let mut external: Vec<(ConnectionProfileTask, TaskSettings)> = Vec::new();
        for task in tasks {
            match TaskSettings::parse(&task.settings) {
                Ok(settings) if settings.is_external() => external.push((task, settings)),
                Ok(settings) => ftp.push((task, settings)),
                Err(error) => {
                    self.warn(format!("task {} has bad settings: {error}", task.name));
                }
            }
        }
        self.state.set_overall_tasks((ftp.len() + external.len()) as u64);

        self.authenticate_shares(ftp.iter().chain(external.iter())).await;

        // Dial-up first: no dial tone, no run
        let mut dial_started: Option<Instant> = None;
        if self.connection.use_dial_up {
            self.state.inc_attempted_dial_ups();
            match self
                .deps
                .dial_up
                .dial(
                    &self.connection.dial_up_entry_name,
                    self.deps.config.dial_up_timeout,
                )
                .await
            {
                Ok(()) => {
                    self.state.inc_successful_dial_ups();
                    dial_started = Some(self.deps.clock.now());
                }
                Err(error) => {
                    self.state.inc_failed_dial_ups();
                    self.warn(format!("dial-up failed: {error}"));
                    let _ = self
                        .deps
                        .dial_up
                        .hang_up(&self.connection.dial_up_entry_name)
                        .await;
                    self.emit(ProgressUpdate::new(ProgressState::Finished, "run ended"));
                    self.state.end_run();
                    return;
                }
            }
        }

        // FTP session; a connect failure aborts only the FTP sub-list
        let mut session: Option<Box<dyn RemoteSession>> = None;
        let mut connected_at: Option<Instant> = None;
        let mut run_failed = false;
        if !ftp.is_empty() {
            self.state.inc_attempted_connections();
            match self
                .deps
                .connector
                .connect(&self.connection, self.deps.config.connection_timeout)
                .await
            {
                Ok(opened) => {
                    self.state.inc_successful_connections();
                    connected_at = Some(self.deps.clock.now());
                    session = Some(opened);
                }
                Err(error) => {
                    self.state.inc_failed_connections();
                    run_failed = true;
                    let message = format!(
                        "unable to connect to {}: {error}",
                        self.connection.host_name
                    );
                    self.warn(message.clone());
                    if let Err(store_error) = self
                        .deps
                        .recorder
                        .record_failure(self.device.id, None, &message)
                        .await
                    {
                        tracing::warn!(device = %self.device.acronym, %store_error, "status log update failed");
                    }
                }
            }
        }

        let mut was_cancelled = false;
        let mut recipients: Vec<String> = Vec::new();

        for (task, settings) in &ftp {
            if self.cancel.is_cancelled() {
                was_cancelled = true;
                break;
            }
            recipients.extend(settings.email_recipient_list());

            if let Some(open) = session.as_mut() {
                let run = TaskRun {
                    device: &self.device,
                    profile: &self.profile,
                    task,
                    settings,
                    config: &self.deps.config,
                    state: &self.state,
                    bus: &self.deps.bus,
                    recorder: &self.deps.recorder,
                    mailer: Arc::clone(&self.deps.mailer),
                    cancel: self.cancel.clone(),
                    clock: &self.deps.clock,
                };
                if run.run(open.as_mut()).await.is_err() {
                    was_cancelled = true;
                    break;
                }
            }
            self.after_task(task, settings);
        }

        if !was_cancelled {
            for (task, settings) in &external {
                if self.cancel.is_cancelled() {
                    was_cancelled = true;
                    break;
                }
                recipients.extend(settings.email_recipient_list());

                let (killed, cancelled) = self.run_external_task(task, settings).await;
                run_failed |= killed;
                if cancelled {
                    was_cancelled = true;
                    break;
                }
                self.after_task(task, settings);
            }
        }

        if let Some(mut open) = session.take() {
            let _ = open.close().await;
        }
        if let Some(started) = connected_at {
            self.state
                .add_connected_time(self.deps.clock.now() - started);
        }

        if was_cancelled {
            self.emit(ProgressUpdate::new(
                ProgressState::Finished,
                "run cancelled",
            ));
        } else {
            let (done, total) = self.state.overall_tasks();
            let terminal = if run_failed {
                ProgressUpdate::new(ProgressState::Failed, "run completed with failures")
            } else {
                ProgressUpdate::new(ProgressState::Succeeded, "run complete")
            };
            self.emit(terminal.with_progress(done, total));
            self.emit(ProgressUpdate::new(ProgressState::Finished, "run finished"));
        }

        if let Some(started) = dial_started {
            let _ = self
                .deps
                .dial_up
                .hang_up(&self.connection.dial_up_entry_name)
                .await;
            self.state.add_dial_up_time(self.deps.clock.now() - started);
        }

        self.state.end_run();
        self.check_download_threshold(&recipients);
        tracing::info!(
            device = %self.device.acronym,
            files = self.state.files_downloaded(),
            "run finished"
        );
    }

    /// Establish UNC credentials once per distinct local path; failure
    /// is a warning and the tasks proceed.
    async fn authenticate_shares<'a>(
        &self,
        tasks: impl Iterator<Item = &'a (ConnectionProfileTask, TaskSettings)>,
    ) {
        let mut seen: HashSet<String> = HashSet::new();
        for (_, settings) in tasks {
            if settings.directory_auth_user_name.is_empty()
                || settings.local_path.trim().is_empty()
            {
                continue;
            }
            if !seen.insert(settings.local_path.clone()) {
                continue;
            }
            if let Err(error) = self
                .deps
                .share_auth
                .authenticate(
                    Path::new(&settings.local_path),
                    &settings.directory_auth_user_name,
                    &settings.directory_auth_password,
                )
                .await
            {
                self.warn(format!(
                    "share authentication for {} failed: {error}",
                    settings.local_path
                ));
            }
        }
    }

    /// Returns (force_killed, cancelled)
    async fn run_external_task(
        &self,
        task: &ConnectionProfileTask,
        settings: &TaskSettings,
    ) -> (bool, bool) {
        let now = self.deps.clock.wall();
        let ctx = template_context(&self.device, &self.profile, task.id, &self.deps.config);
        let command = expand(&settings.external_operation, now, &ctx);
        let work_dir = resolve_local_base(
            &self.device,
            &self.profile,
            task,
            settings,
            &self.deps.config,
            now,
        );

        match run_external_operation(
            &command,
            &work_dir,
            settings.external_operation_timeout,
            &self.cancel,
            &self.state,
        )
        .await
        {
            Ok(outcome) => {
                if outcome.timed_out {
                    self.emit(ProgressUpdate::new(
                        ProgressState::Failed,
                        format!(
                            "external operation for task {} exceeded timeout of {:?}",
                            task.name, settings.external_operation_timeout
                        ),
                    ));
                } else if outcome.cancelled {
                    // Finished is emitted by the caller
                } else {
                    match outcome.exit_code {
                        Some(0) | None => self.emit(
                            ProgressUpdate::new(
                                ProgressState::Succeeded,
                                format!(
                                    "external operation for task {} retrieved {} files",
                                    task.name, outcome.new_files
                                ),
                            )
                            .with_summary(&task.name),
                        ),
                        Some(code) => self.emit(ProgressUpdate::new(
                            ProgressState::Processing,
                            format!(
                                "external operation for task {} exited with code {code}",
                                task.name
                            ),
                        )),
                    }
                }
                (outcome.timed_out, outcome.cancelled)
            }
            Err(error) => {
                self.warn(format!(
                    "external operation for task {} failed: {error}",
                    task.name
                ));
                (false, false)
            }
        }
    }

    /// Post-task bookkeeping: local age purge and the Processing anchor
    fn after_task(&self, task: &ConnectionProfileTask, settings: &TaskSettings) {
        if settings.delete_old_local_files {
            let dir = resolve_local_base(
                &self.device,
                &self.profile,
                task,
                settings,
                &self.deps.config,
                self.deps.clock.wall(),
            );
            match localfs::purge_old_files(
                &dir,
                self.deps.config.max_local_file_age,
                self.deps.clock.wall(),
            ) {
                Ok(removed) if removed > 0 => {
                    tracing::info!(device = %self.device.acronym, removed, "purged old local files");
                }
                Ok(_) => {}
                Err(error) => self.warn(format!("local age purge failed: {error}")),
            }
        }

        self.state.task_completed();
        let (done, total) = self.state.overall_tasks();
        self.emit(
            ProgressUpdate::new(
                ProgressState::Processing,
                format!("completed task {} of {total}", done),
            )
            .with_summary(&task.name)
            .with_progress(done, total),
        );
    }

    /// Alert (never block) when the trailing window exceeds the
    /// configured download threshold.
    fn check_download_threshold(&self, recipients: &[String]) {
        let threshold = self.deps.config.max_download_threshold;
        if threshold == 0 {
            return;
        }
        let window = self.deps.config.max_download_threshold_window;
        let now = self.deps.clock.now();

        let total: u64 = {
            let mut runs = self
                .download_window
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            runs.push_back((now, self.state.files_downloaded()));
            while let Some((at, _)) = runs.front() {
                if now.duration_since(*at) > window {
                    runs.pop_front();
                } else {
                    break;
                }
            }
            runs.iter().map(|(_, files)| files).sum()
        };

        if total <= threshold {
            return;
        }

        let mut last = self
            .last_threshold_alert
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let due = last.map_or(true, |at| now.duration_since(at) >= window);
        if !due {
            return;
        }
        *last = Some(now);

        let message = format!(
            "{total} files downloaded from {} within {window:?}, over the threshold of {threshold}",
            self.device.acronym
        );
        self.warn(message.clone());
        if !recipients.is_empty() {
            service::send_alert_mail(
                Arc::clone(&self.deps.mailer),
                recipients.to_vec(),
                format!("Download threshold exceeded for {}", self.device.acronym),
                message,
            );
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
