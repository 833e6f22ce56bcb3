// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transfer engine: one FTP task from enumeration to finish
//!
//! Enumerate walks the remote tree (depth-first, dot-directories
//! skipped) applying the filter chain: wildcard pattern, remote age,
//! size cap, skip-if-unchanged. Plan groups survivors by destination
//! directory; a directory that cannot be created skips its whole group
//! while still advancing progress by the group's byte total. Transfer
//! pre-increments progress before each attempt so `complete` never
//! moves backwards, and a per-file failure is never fatal to the task.

use crate::localfs;
use crate::recorder::StatusRecorder;
use ff_adapters::mailer::Mailer;
use ff_adapters::remote::{RemoteEntry, RemoteSession};
use ff_core::cancel::{CancelToken, Cancelled};
use ff_core::clock::Clock;
use ff_core::config::Config;
use ff_core::model::{ConnectionProfile, ConnectionProfileTask, Device};
use ff_core::progress::{DeviceProgress, ProgressBus, ProgressState, ProgressUpdate};
use ff_core::settings::TaskSettings;
use ff_core::stats::RuntimeState;
use ff_core::template::{expand, TemplateContext};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Counts for one task execution
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub downloaded: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Everything one task execution needs; owned by the device runner
pub struct TaskRun<'a, C: Clock> {
    pub device: &'a Device,
    pub profile: &'a ConnectionProfile,
    pub task: &'a ConnectionProfileTask,
    pub settings: &'a TaskSettings,
    pub config: &'a Config,
    pub state: &'a RuntimeState,
    pub bus: &'a ProgressBus,
    pub recorder: &'a StatusRecorder,
    pub mailer: Arc<dyn Mailer>,
    pub cancel: CancelToken,
    pub clock: &'a C,
}

struct Candidate {
    entry: RemoteEntry,
    dest_dir: PathBuf,
}

/// Substitution values for one device/profile/task combination
pub(crate) fn template_context(
    device: &Device,
    profile: &ConnectionProfile,
    task_id: i32,
    config: &Config,
) -> TemplateContext {
    TemplateContext {
        device_name: device.display_name().to_string(),
        device_acronym: device.acronym.clone(),
        device_folder_name: device.folder_name().to_string(),
        device_folder_path: config
            .default_local_path
            .join(device.folder_name())
            .display()
            .to_string(),
        profile_name: profile.name.clone(),
        device_id: device.id,
        task_id,
    }
}

/// Base local directory for a task: its local path (or the default
/// per-device folder) plus the expanded naming expression.
pub(crate) fn resolve_local_base(
    device: &Device,
    profile: &ConnectionProfile,
    task: &ConnectionProfileTask,
    settings: &TaskSettings,
    config: &Config,
    now: chrono::NaiveDateTime,
) -> PathBuf {
    let ctx = template_context(device, profile, task.id, config);
    let base = if settings.local_path.trim().is_empty() {
        config.default_local_path.join(device.folder_name())
    } else {
        PathBuf::from(expand(&settings.local_path, now, &ctx))
    };
    let sub = expand(&settings.directory_naming_expression, now, &ctx).replace('\\', "/");
    if sub.is_empty() {
        base
    } else {
        base.join(sub)
    }
}

impl<C: Clock> TaskRun<'_, C> {
    /// Drive the task through prepare, enumerate, plan, transfer, and
    /// finish. Only cancellation aborts; everything else is per-unit.
    pub async fn run(&self, session: &mut dyn RemoteSession) -> Result<TaskSummary, Cancelled> {
        let mut summary = TaskSummary::default();
        let now = self.clock.wall();

        // Prepare
        let local_base = self.local_base(now);
        if let Err(error) = std::fs::create_dir_all(&local_base) {
            self.warn(format!(
                "cannot create local directory {}: {error}",
                local_base.display()
            ));
            return Ok(summary);
        }
        let matcher = self.build_matcher();
        let remote_root = expand(&self.settings.remote_path, now, &self.template_context());

        // Enumerate
        let mut candidates = self
            .enumerate(session, &matcher, &remote_root, &local_base, now, &mut summary)
            .await?;

        if self.settings.maximum_file_count >= 0
            && candidates.len() as i64 > self.settings.maximum_file_count
        {
            let dropped = candidates.len() as i64 - self.settings.maximum_file_count;
            candidates.truncate(self.settings.maximum_file_count as usize);
            self.emit(
                ProgressUpdate::new(
                    ProgressState::Processing,
                    format!("file count limit reached, deferring {dropped} files"),
                )
                .with_summary(&self.task.name),
            );
        }

        // Plan: group by destination directory
        let total: u64 = candidates.iter().map(|c| c.entry.size).sum();
        let mut complete: u64 = 0;
        let mut groups: BTreeMap<PathBuf, Vec<Candidate>> = BTreeMap::new();
        for candidate in candidates {
            groups
                .entry(candidate.dest_dir.clone())
                .or_default()
                .push(candidate);
        }

        // Transfer
        for (dest_dir, group) in groups {
            self.cancel.checkpoint()?;

            if let Err(error) = std::fs::create_dir_all(&dest_dir) {
                let group_bytes: u64 = group.iter().map(|c| c.entry.size).sum();
                complete += group_bytes;
                summary.failed += group.len() as u64;
                self.progress(
                    ProgressState::Failed,
                    format!(
                        "cannot create {}: {error}; skipping {} files",
                        dest_dir.display(),
                        group.len()
                    ),
                    complete,
                    total,
                );
                continue;
            }

            for candidate in group {
                self.cancel.checkpoint()?;
                complete += candidate.entry.size;
                self.state.inc_total_processed_files();
                self.transfer_one(session, &candidate, complete, total, &mut summary)
                    .await;
            }
        }

        // Finish: re-publish the final complete == total
        self.progress(
            ProgressState::Succeeded,
            format!("task {} complete", self.task.name),
            total,
            total,
        );
        Ok(summary)
    }

    async fn transfer_one(
        &self,
        session: &mut dyn RemoteSession,
        candidate: &Candidate,
        complete: u64,
        total: u64,
        summary: &mut TaskSummary,
    ) {
        let entry = &candidate.entry;
        let local = candidate.dest_dir.join(&entry.name);

        if local.exists() && self.settings.archive_existing_files_before_download {
            match localfs::archive_existing(&local) {
                Ok(archived) => {
                    tracing::debug!(from = %local.display(), to = %archived.display(), "archived previous copy");
                }
                Err(error) => self.warn(format!(
                    "failed to archive {}: {error}",
                    local.display()
                )),
            }
        }

        if local.exists() && !self.settings.overwrite_existing_local_files {
            summary.skipped += 1;
            self.progress(
                ProgressState::Processing,
                format!("{} exists, not overwriting", entry.name),
                complete,
                total,
            );
            return;
        }

        match session.download(&entry.path, &local).await {
            Ok(()) => {
                self.state.record_download(entry.size);
                summary.downloaded += 1;

                if self.settings.synchronize_timestamps {
                    if let Err(error) = localfs::sync_file_times(&local, entry.modified) {
                        self.warn(format!(
                            "failed to set timestamps on {}: {error}",
                            local.display()
                        ));
                    }
                }

                self.progress(
                    ProgressState::Succeeded,
                    format!("downloaded {}", entry.name),
                    complete,
                    total,
                );

                if let Err(error) = self
                    .recorder
                    .record_success(self.device.id, &entry.name, entry.size)
                    .await
                {
                    self.warn(format!("status log update failed: {error}"));
                }

                if self.settings.delete_remote_files_after_download {
                    if let Err(error) = session.remove(&entry.path).await {
                        self.warn(format!(
                            "failed to delete remote {}: {error}",
                            entry.path
                        ));
                    }
                }

                if self.settings.email_on_file_update {
                    self.notify_by_mail(&entry.name);
                }
            }
            Err(error) => {
                summary.failed += 1;
                self.progress(
                    ProgressState::Failed,
                    format!("download of {} failed: {error}", entry.name),
                    complete,
                    total,
                );
                if let Err(store_error) = self
                    .recorder
                    .record_failure(self.device.id, Some(&entry.name), &error.to_string())
                    .await
                {
                    self.warn(format!("status log update failed: {store_error}"));
                }
            }
        }
    }

    /// Depth-first remote walk applying the filter chain
    async fn enumerate(
        &self,
        session: &mut dyn RemoteSession,
        matcher: &GlobSet,
        root: &str,
        local_base: &Path,
        now: chrono::NaiveDateTime,
        summary: &mut TaskSummary,
    ) -> Result<Vec<Candidate>, Cancelled> {
        let mut files = Vec::new();
        let mut stack = vec![(root.to_string(), local_base.to_path_buf())];

        while let Some((dir, dest)) = stack.pop() {
            self.cancel.checkpoint()?;

            let entries = match session.list(&dir).await {
                Ok(entries) => entries,
                Err(error) => {
                    // Scoped warning: sibling directories proceed
                    self.warn(format!("listing {dir} failed: {error}"));
                    continue;
                }
            };

            for entry in entries {
                self.cancel.checkpoint()?;

                if entry.is_dir {
                    if self.settings.recursive_download && !entry.name.starts_with('.') {
                        stack.push((entry.path.clone(), dest.join(&entry.name)));
                    }
                    continue;
                }

                if !matcher.is_match(&entry.name) {
                    continue;
                }

                if self.settings.limit_remote_file_download_by_age {
                    let age = localfs::whole_days_old(now, entry.modified);
                    if age > self.config.max_remote_file_age {
                        summary.skipped += 1;
                        self.emit(
                            ProgressUpdate::new(
                                ProgressState::Skipped,
                                format!("skipping {}: {age} days old", entry.name),
                            )
                            .with_summary(&self.task.name),
                        );
                        continue;
                    }
                }

                if entry.size > self.settings.maximum_file_size_bytes() {
                    summary.skipped += 1;
                    self.emit(
                        ProgressUpdate::new(
                            ProgressState::Skipped,
                            format!(
                                "skipping {}: {:.1} MB exceeds the size limit",
                                entry.name,
                                entry.size as f64 / 1_000_000.0
                            ),
                        )
                        .with_summary(&self.task.name),
                    );
                    continue;
                }

                if self.settings.skip_download_if_unchanged
                    && self.is_unchanged(&dest.join(&entry.name), &entry)
                {
                    summary.skipped += 1;
                    self.emit(
                        ProgressUpdate::new(
                            ProgressState::Skipped,
                            format!("{} unchanged", entry.name),
                        )
                        .with_summary(&self.task.name),
                    );
                    continue;
                }

                files.push(Candidate {
                    entry,
                    dest_dir: dest.clone(),
                });
            }
        }

        Ok(files)
    }

    /// Local copy matches size and (when syncing timestamps) mtime
    fn is_unchanged(&self, local: &Path, entry: &RemoteEntry) -> bool {
        let Ok(metadata) = std::fs::metadata(local) else {
            return false;
        };
        if metadata.len() != entry.size {
            return false;
        }
        if !self.settings.synchronize_timestamps {
            return true;
        }
        metadata
            .modified()
            .map(localfs::system_time_to_naive_local)
            .map(|local_mtime| {
                local_mtime.and_utc().timestamp() == entry.modified.and_utc().timestamp()
            })
            .unwrap_or(false)
    }

    fn template_context(&self) -> TemplateContext {
        template_context(self.device, self.profile, self.task.id, self.config)
    }

    fn local_base(&self, now: chrono::NaiveDateTime) -> PathBuf {
        resolve_local_base(
            self.device,
            self.profile,
            self.task,
            self.settings,
            self.config,
            now,
        )
    }

    fn build_matcher(&self) -> GlobSet {
        let mut builder = GlobSetBuilder::new();
        for spec in self.settings.file_specs() {
            match GlobBuilder::new(&spec).case_insensitive(true).build() {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(error) => {
                    self.warn(format!("ignoring bad file pattern {spec:?}: {error}"));
                }
            }
        }
        builder.build().unwrap_or_else(|_| GlobSet::empty())
    }

    fn emit(&self, update: ProgressUpdate) {
        self.bus
            .broadcast(DeviceProgress::one(self.device.acronym.clone(), update));
    }

    fn progress(&self, state: ProgressState, message: String, complete: u64, total: u64) {
        self.emit(
            ProgressUpdate::new(state, message)
                .with_summary(&self.task.name)
                .with_progress(complete, total),
        );
    }

    /// Warning: logged and surfaced as a Failed progress update, never
    /// fatal to the task.
    fn warn(&self, message: String) {
        tracing::warn!(device = %self.device.acronym, task = %self.task.name, "{message}");
        self.emit(ProgressUpdate::new(ProgressState::Failed, message).with_summary(&self.task.name));
    }

    fn notify_by_mail(&self, file_name: &str) {
        let recipients = self.settings.email_recipient_list();
        if recipients.is_empty() {
            return;
        }
        let mailer = Arc::clone(&self.mailer);
        let subject = format!("New file downloaded from {}", self.device.acronym);
        let body = format!("{file_name} was downloaded from {}", self.device.acronym);
        // Fire and forget: mail failure is a warning in the log only
        tokio::spawn(async move {
            if let Err(error) = mailer.send(&recipients, &subject, &body).await {
                tracing::warn!(%error, "file-update notification failed");
            }
        });
    }
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
