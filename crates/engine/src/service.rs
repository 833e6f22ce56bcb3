// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet service: runner registry, schedule routing, and shutdown
//!
//! Owns the shared thread pool, the resource-serialized registry, and
//! the schedule clock. A `ScheduleDue` event names a device acronym;
//! the router looks up its runner and requests one coalesced run.

use crate::runner::{DeviceRunner, EngineDeps, RunnerError};
use ff_adapters::mailer::Mailer;
use ff_core::cancel::CancelToken;
use ff_core::clock::Clock;
use ff_core::exec::{ResourceThreads, ThreadPool};
use ff_core::model::{ConnectionProfile, Device};
use ff_core::progress::DeviceProgress;
use ff_core::schedule::{CronParseError, CronSchedule, ScheduleClock, ScheduleDue};
use ff_core::stats::DeviceStatistics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error("bad schedule for {device}: {source}")]
    BadSchedule {
        device: String,
        source: CronParseError,
    },
    #[error("device already registered: {0}")]
    Duplicate(String),
}

/// Fire-and-forget notification mail; failure is a log warning only
pub(crate) fn send_alert_mail(
    mailer: Arc<dyn Mailer>,
    recipients: Vec<String>,
    subject: String,
    body: String,
) {
    tokio::spawn(async move {
        if let Err(error) = mailer.send(&recipients, &subject, &body).await {
            tracing::warn!(%error, subject, "alert mail failed");
        }
    });
}

pub struct FleetService<C: Clock> {
    deps: Arc<EngineDeps<C>>,
    pool: ThreadPool,
    resources: ResourceThreads,
    schedule: ScheduleClock<C>,
    runners: Arc<Mutex<HashMap<String, Arc<DeviceRunner<C>>>>>,
    cancel: CancelToken,
}

impl<C: Clock> FleetService<C> {
    /// Build the service and start the schedule ticker and router
    pub fn start(deps: EngineDeps<C>) -> Self {
        let cancel = CancelToken::new();
        let pool = ThreadPool::new(deps.config.ftp_thread_count);
        let (schedule, due_rx) = ScheduleClock::new(deps.clock.clone());
        let runners: Arc<Mutex<HashMap<String, Arc<DeviceRunner<C>>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let _ticker = schedule.clone().run(cancel.clone());
        Self::spawn_router(due_rx, Arc::clone(&runners), cancel.clone());

        Self {
            deps: Arc::new(deps),
            pool,
            resources: ResourceThreads::new(),
            schedule,
            runners,
            cancel,
        }
    }

    fn spawn_router(
        mut due_rx: mpsc::UnboundedReceiver<ScheduleDue>,
        runners: Arc<Mutex<HashMap<String, Arc<DeviceRunner<C>>>>>,
        cancel: CancelToken,
    ) {
        tokio::spawn(async move {
            loop {
                let due = tokio::select! {
                    _ = cancel.cancelled() => break,
                    due = due_rx.recv() => match due {
                        Some(due) => due,
                        None => break,
                    },
                };
                let runner = {
                    let runners = runners.lock().unwrap_or_else(|e| e.into_inner());
                    runners.get(&due.name).cloned()
                };
                match runner {
                    Some(runner) => runner.trigger(),
                    None => {
                        tracing::warn!(schedule = %due.name, "schedule fired for unknown device")
                    }
                }
            }
            tracing::debug!("schedule router stopped");
        });
    }

    /// Register a device with its profile and cron schedule. Disabled
    /// devices get a runner (manual triggers work) but no schedule.
    pub fn register_device(
        &self,
        device: Device,
        profile: ConnectionProfile,
        cron_expr: &str,
    ) -> Result<(), ServiceError> {
        let acronym = device.acronym.clone();
        let enabled = device.enabled;

        let cron =
            CronSchedule::parse(cron_expr).map_err(|source| ServiceError::BadSchedule {
                device: acronym.clone(),
                source,
            })?;

        let runner = DeviceRunner::register(
            device,
            profile,
            Arc::clone(&self.deps),
            &self.pool,
            &self.resources,
            self.cancel.clone(),
        )?;

        {
            let mut runners = self.runners.lock().unwrap_or_else(|e| e.into_inner());
            if runners.contains_key(&acronym) {
                return Err(ServiceError::Duplicate(acronym));
            }
            runners.insert(acronym.clone(), Arc::new(runner));
        }

        if enabled {
            self.schedule.add(acronym.clone(), cron);
        }
        tracing::info!(device = %acronym, enabled, "device registered");
        Ok(())
    }

    /// Remove a device's schedule and runner (shutdown or reload)
    pub fn deregister_device(&self, acronym: &str) -> bool {
        self.schedule.remove(acronym);
        let removed = {
            let mut runners = self.runners.lock().unwrap_or_else(|e| e.into_inner());
            runners.remove(acronym).is_some()
        };
        if removed {
            tracing::info!(device = %acronym, "device deregistered");
        }
        removed
    }

    pub fn runner(&self, acronym: &str) -> Option<Arc<DeviceRunner<C>>> {
        let runners = self.runners.lock().unwrap_or_else(|e| e.into_inner());
        runners.get(acronym).cloned()
    }

    /// Manual "run now" for one device; true if the device exists
    pub fn trigger_now(&self, acronym: &str) -> bool {
        match self.runner(acronym) {
            Some(runner) => {
                runner.trigger_manual();
                true
            }
            None => false,
        }
    }

    /// Manual run that waits for completion
    pub async fn run_now(&self, acronym: &str) -> bool {
        match self.runner(acronym) {
            Some(runner) => {
                runner.run_now().await;
                true
            }
            None => false,
        }
    }

    /// Statistics snapshot per registered device, sorted by acronym
    pub fn statistics(&self) -> Vec<(String, DeviceStatistics)> {
        let runners = self.runners.lock().unwrap_or_else(|e| e.into_inner());
        let mut stats: Vec<(String, DeviceStatistics)> = runners
            .iter()
            .map(|(acronym, runner)| (acronym.clone(), runner.statistics()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    pub fn subscribe_progress(
        &self,
        client_id: impl Into<String>,
    ) -> mpsc::UnboundedReceiver<DeviceProgress> {
        self.deps.bus.subscribe(client_id)
    }

    /// Evaluate schedules immediately (the ticker does this once per
    /// second); exposed for tests and the daemon's reload path.
    pub fn poll_schedules(&self) {
        self.schedule.poll();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stop the clock, abort in-flight runs, and close every thread
    pub fn shutdown(&self) {
        tracing::info!("fleet service shutting down");
        self.cancel.cancel();
        self.pool.close_all();
        self.resources.close_all();
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
