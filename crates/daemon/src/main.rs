// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet Fetch Daemon (ffd)
//!
//! Background process that owns the schedule clock and drives device
//! runs. Loads the global config and the fleet file, registers every
//! device, then idles until SIGTERM/SIGINT.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod adapters;
mod fleet;

use anyhow::Context;
use clap::Parser;
use ff_adapters::{LogMailer, MemoryStatusStore, NoopShareAuth, StatusStore};
use ff_core::clock::SystemClock;
use ff_core::config::Config;
use ff_core::progress::ProgressBus;
use ff_engine::{EngineDeps, FleetService, StatusRecorder};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "ffd", about = "Fleet Fetch download daemon")]
struct Args {
    /// Global configuration file (created with defaults if missing)
    #[arg(long, default_value = "ff.toml")]
    config: PathBuf,

    /// Fleet file: devices, profiles, tasks, schedules
    #[arg(long, default_value = "fleet.toml")]
    fleet: PathBuf,

    /// Log to a file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Trigger one manual run for this device, wait for it, then exit
    #[arg(long, value_name = "ACRONYM")]
    run_now: Option<String>,

    /// How often to log per-device statistics
    #[arg(long, default_value = "300")]
    stats_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_dir.as_deref())?;

    let config = Config::load_or_init(&args.config).context("loading configuration")?;
    let fleet = fleet::FleetFile::load(&args.fleet).context("loading fleet file")?;
    info!(
        devices = fleet.devices.len(),
        profiles = fleet.profiles.len(),
        "fleet loaded"
    );

    // Seed the in-memory store with the fleet's tasks
    let store = MemoryStatusStore::new();
    for profile in &fleet.profiles {
        store.put_tasks(profile.id, fleet.tasks_for(profile.id));
    }

    let recorder = StatusRecorder::new(
        Arc::new(store.clone()) as Arc<dyn StatusStore>,
        &config.status_log_inclusions,
        &config.status_log_exclusions,
    );

    let service = FleetService::start(EngineDeps {
        config,
        connector: Arc::new(adapters::UnconfiguredRemote),
        dial_up: Arc::new(adapters::UnconfiguredDialUp),
        store: Arc::new(store),
        recorder: Arc::new(recorder),
        mailer: Arc::new(LogMailer),
        share_auth: Arc::new(NoopShareAuth),
        bus: ProgressBus::new(),
        clock: SystemClock,
    });

    for entry in &fleet.devices {
        let profile = fleet
            .profile(entry.profile)
            .expect("validated at load time")
            .clone();
        match service.register_device(entry.device.clone(), profile, &entry.schedule) {
            Ok(()) => {}
            Err(error) => {
                // Bad config disables this device until the next reload
                warn!(device = %entry.device.acronym, %error, "device not registered");
            }
        }
    }

    if let Some(acronym) = args.run_now {
        info!(device = %acronym, "manual run requested");
        if !service.run_now(&acronym).await {
            error!(device = %acronym, "no such device");
            std::process::exit(1);
        }
        service.shutdown();
        return Ok(());
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let stats_interval = Duration::from_secs(args.stats_interval_secs.max(1));
    info!("ffd ready");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
            _ = tokio::time::sleep(stats_interval) => {
                for (device, stats) in service.statistics() {
                    info!(
                        %device,
                        files = stats.files_downloaded,
                        megabytes = format!("{:.2}", stats.megabytes_downloaded),
                        connections = stats.successful_connections,
                        "statistics"
                    );
                }
            }
        }
    }

    service.shutdown();
    info!("ffd stopped");
    Ok(())
}

fn setup_logging(
    log_dir: Option<&std::path::Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("creating log directory")?;
            let appender = tracing_appender::rolling::never(dir, "ffd.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}
