// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::recorder::StatusRecorder;
use chrono::{NaiveDate, NaiveDateTime};
use ff_adapters::{FakeDialUp, FakeMailer, FakeRemote, FakeShareAuth, MemoryStatusStore, RemoteCall};
use ff_core::clock::FakeClock;
use ff_core::model::ConnectionProfileTask;
use ff_core::progress::ProgressBus;
use std::time::Duration;

fn mtime() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1)
        .unwrap()
        .and_hms_opt(3, 0, 0)
        .unwrap()
}

struct Rig {
    _tmp: tempfile::TempDir,
    remote: FakeRemote,
    dialup: FakeDialUp,
    store: MemoryStatusStore,
    deps: Arc<EngineDeps<FakeClock>>,
    pool: ThreadPool,
    resources: ResourceThreads,
    cancel: CancelToken,
    tasks: Mutex<Vec<ConnectionProfileTask>>,
}

impl Rig {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            default_local_path: tmp.path().to_path_buf(),
            connection_timeout: Duration::from_secs(2),
            dial_up_timeout: Duration::from_secs(2),
            ..Config::default()
        };
        let remote = FakeRemote::new();
        let dialup = FakeDialUp::new();
        let store = MemoryStatusStore::new();
        let recorder = StatusRecorder::new(
            Arc::new(store.clone()),
            &config.status_log_inclusions,
            &config.status_log_exclusions,
        );

        let deps = Arc::new(EngineDeps {
            config,
            connector: Arc::new(remote.clone()),
            dial_up: Arc::new(dialup.clone()),
            store: Arc::new(store.clone()),
            recorder: Arc::new(recorder),
            mailer: Arc::new(FakeMailer::new()),
            share_auth: Arc::new(FakeShareAuth::new()),
            bus: ProgressBus::new(),
            clock: FakeClock::new(),
        });

        Self {
            _tmp: tmp,
            remote,
            dialup,
            store,
            deps,
            pool: ThreadPool::new(2),
            resources: ResourceThreads::new(),
            cancel: CancelToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn device(&self, connection: &str) -> Device {
        Device {
            id: 7,
            acronym: "SHELBY".to_string(),
            name: "Shelby".to_string(),
            enabled: true,
            original_source: None,
            connection: connection.to_string(),
        }
    }

    fn profile(&self) -> ConnectionProfile {
        ConnectionProfile {
            id: 1,
            name: "nightly".to_string(),
        }
    }

    fn add_task(&self, id: i32, settings: &str) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.push(ConnectionProfileTask {
            id,
            profile_id: 1,
            name: format!("task-{id}"),
            settings: settings.to_string(),
        });
        self.store.put_tasks(1, tasks.clone());
    }

    fn register(&self, device: Device) -> DeviceRunner<FakeClock> {
        DeviceRunner::register(
            device,
            self.profile(),
            Arc::clone(&self.deps),
            &self.pool,
            &self.resources,
            self.cancel.clone(),
        )
        .unwrap()
    }
}

async fn wait_for_runs(runner: &DeviceRunner<FakeClock>, runs: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while runner.completed_runs() < runs {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run did not complete in time");
}

const FTP_TASK: &str =
    "directoryNamingExpression=;remotePath=/data;overwriteExistingLocalFiles=true";

#[tokio::test]
async fn bad_connection_string_is_fatal_to_registration() {
    let rig = Rig::new();
    let result = DeviceRunner::register(
        rig.device("port=not-a-number"),
        rig.profile(),
        Arc::clone(&rig.deps),
        &rig.pool,
        &rig.resources,
        rig.cancel.clone(),
    );
    assert!(matches!(result, Err(RunnerError::BadConnection { .. })));
}

#[tokio::test]
async fn scheduled_trigger_runs_the_profile() {
    let rig = Rig::new();
    rig.remote.add_file("/data", "a.dat", 100, mtime());
    rig.remote.add_file("/data", "b.dat", 50, mtime());
    rig.add_task(42, FTP_TASK);

    let runner = rig.register(rig.device("hostName=meter-7"));
    runner.trigger();
    wait_for_runs(&runner, 1).await;

    let state = runner.state();
    assert_eq!(state.files_downloaded(), 2);
    assert_eq!(state.bytes_downloaded(), 150);
    assert_eq!(state.attempted_connections(), 1);
    assert_eq!(state.successful_connections(), 1);
    assert_eq!(state.failed_connections(), 0);
}

#[tokio::test]
async fn manual_trigger_precounts_a_connection_attempt() {
    let rig = Rig::new();
    rig.remote.add_file("/data", "a.dat", 100, mtime());
    rig.add_task(42, FTP_TASK);

    let runner = rig.register(rig.device("hostName=meter-7"));
    runner.run_now().await;

    // One pre-count at trigger time plus one at session open
    let state = runner.state();
    assert_eq!(state.attempted_connections(), 2);
    assert_eq!(state.successful_connections(), 1);
}

#[tokio::test]
async fn connect_failure_counts_and_skips_ftp_tasks() {
    let rig = Rig::new();
    rig.remote.add_file("/data", "a.dat", 100, mtime());
    rig.remote.fail_connect(true);
    rig.add_task(42, FTP_TASK);

    let runner = rig.register(rig.device("hostName=meter-7"));
    runner.trigger();
    wait_for_runs(&runner, 1).await;

    let state = runner.state();
    assert_eq!(state.attempted_connections(), 1);
    assert_eq!(state.failed_connections(), 1);
    assert_eq!(state.files_downloaded(), 0);
    assert!(rig.remote.downloads().is_empty());

    // The failure reached the status log
    let log = rig.store.status_log_row(7).unwrap();
    assert!(log.message.as_deref().unwrap().contains("unable to connect"));
}

#[cfg(unix)]
#[tokio::test]
async fn connect_failure_still_runs_external_tasks() {
    let rig = Rig::new();
    rig.remote.add_file("/data", "a.dat", 100, mtime());
    rig.remote.fail_connect(true);
    rig.add_task(42, FTP_TASK);
    rig.add_task(
        43,
        "directoryNamingExpression=;externalOperation=sh -c 'printf x > pulled.dat';externalOperationTimeout=30",
    );

    let runner = rig.register(rig.device("hostName=meter-7"));
    runner.trigger();
    wait_for_runs(&runner, 1).await;

    let state = runner.state();
    assert_eq!(state.failed_connections(), 1);
    // The external task delivered its file despite the FTP failure
    assert_eq!(state.files_downloaded(), 1);
}

#[tokio::test]
async fn dial_up_failure_ends_the_run_before_any_connect() {
    let rig = Rig::new();
    rig.remote.add_file("/data", "a.dat", 100, mtime());
    rig.dialup.fail_entry("M1");
    rig.add_task(42, FTP_TASK);

    let runner = rig.register(rig.device("useDialUp=true;dialUpEntryName=M1;hostName=meter-7"));
    runner.trigger();
    wait_for_runs(&runner, 1).await;

    let state = runner.state();
    assert_eq!(state.attempted_dial_ups(), 1);
    assert_eq!(state.failed_dial_ups(), 1);
    assert_eq!(state.successful_dial_ups(), 0);
    assert_eq!(state.attempted_connections(), 0);
    assert!(!rig
        .remote
        .calls()
        .iter()
        .any(|c| matches!(c, RemoteCall::Connect { .. })));

    // Best-effort hang-up happened
    let events = rig.dialup.events();
    assert!(events
        .iter()
        .any(|e| e.kind == ff_adapters::DialEventKind::HangUp));
}

#[tokio::test]
async fn successful_dial_up_run_hangs_up_afterwards() {
    let rig = Rig::new();
    rig.remote.add_file("/data", "a.dat", 100, mtime());
    rig.add_task(42, FTP_TASK);

    let runner = rig.register(rig.device("useDialUp=true;dialUpEntryName=M1;hostName=meter-7"));
    runner.trigger();
    wait_for_runs(&runner, 1).await;

    let state = runner.state();
    assert_eq!(state.successful_dial_ups(), 1);
    assert_eq!(state.files_downloaded(), 1);

    let events = rig.dialup.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, ff_adapters::DialEventKind::Dial);
    assert_eq!(events[1].kind, ff_adapters::DialEventKind::HangUp);
}

#[tokio::test]
async fn files_downloaded_resets_every_run_while_totals_accumulate() {
    let rig = Rig::new();
    rig.remote.add_file("/data", "a.dat", 100, mtime());
    rig.remote.add_file("/data", "b.dat", 50, mtime());
    rig.add_task(42, FTP_TASK);

    let runner = rig.register(rig.device("hostName=meter-7"));
    runner.trigger();
    wait_for_runs(&runner, 1).await;
    runner.trigger();
    wait_for_runs(&runner, 2).await;

    let state = runner.state();
    assert_eq!(state.files_downloaded(), 2);
    assert_eq!(state.total_files_downloaded(), 4);
    assert_eq!(state.attempted_connections(), 2);
}

#[tokio::test]
async fn share_auth_runs_once_per_distinct_path_and_failure_is_soft() {
    let rig = Rig::new();
    rig.remote.add_file("/data", "a.dat", 100, mtime());
    let auth = FakeShareAuth::new();
    auth.fail(true);
    let deps = Arc::new(EngineDeps {
        share_auth: Arc::new(auth.clone()),
        config: rig.deps.config.clone(),
        connector: Arc::clone(&rig.deps.connector),
        dial_up: Arc::clone(&rig.deps.dial_up),
        store: Arc::clone(&rig.deps.store),
        recorder: Arc::clone(&rig.deps.recorder),
        mailer: Arc::clone(&rig.deps.mailer),
        bus: rig.deps.bus.clone(),
        clock: rig.deps.clock.clone(),
    });

    let shared = "directoryNamingExpression=;remotePath=/data;overwriteExistingLocalFiles=true;\
                  localPath=//nas/meters;directoryAuthUserName=CORP\\svc;directoryAuthPassword=pw";
    rig.add_task(42, shared);
    rig.add_task(43, shared);

    let runner = DeviceRunner::register(
        rig.device("hostName=meter-7"),
        rig.profile(),
        deps,
        &rig.pool,
        &rig.resources,
        rig.cancel.clone(),
    )
    .unwrap();
    runner.trigger();
    wait_for_runs(&runner, 1).await;

    // Two tasks, one distinct path, one auth call; run still connected
    assert_eq!(auth.calls().len(), 1);
    assert_eq!(runner.state().successful_connections(), 1);
}
