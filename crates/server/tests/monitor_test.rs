// Copyright 2024 svcdash Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Monitoring passes over a scripted backend

mod common;

use common::{log_rows, monitor_in, FakeBackend, FakeProbe};
use std::time::Duration;
use svcdash_core::{DetectionMethod, ServiceDeclaration};
use svcdash_server::{aggregate, load_snapshot};
use tokio_util::sync::CancellationToken;

fn declarations() -> Vec<ServiceDeclaration> {
    vec![
        ServiceDeclaration::new("web").with_port(8080),
        ServiceDeclaration::new("db").with_systemd_name("postgresql.service"),
        ServiceDeclaration::new("flaky").with_port(9999),
    ]
}

#[tokio::test]
async fn test_aggregate_survives_failing_probe() {
    let backend = FakeBackend::new();
    backend.set_probe("web", FakeProbe::Active);
    backend.set_probe("db", FakeProbe::Active);
    backend.set_probe("flaky", FakeProbe::Fail);

    let statuses = aggregate(backend.as_ref(), &declarations()).await;

    let names: Vec<&str> = statuses.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["web", "db", "flaky"]);
    assert!(statuses[0].active);
    assert!(statuses[1].active && statuses[1].is_systemd);
    assert!(!statuses[2].active);
    assert_eq!(statuses[2].detection_method, DetectionMethod::PortCheck);
}

#[tokio::test]
async fn test_cycle_logs_changes_and_publishes_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new();
    backend.set_probe("web", FakeProbe::Active);
    let monitor = monitor_in(dir.path(), backend.clone(), declarations());

    let first = monitor.run_cycle().await;
    assert!(first.changes.is_empty());
    assert!(log_rows(dir.path()).is_empty());

    backend.set_probe("web", FakeProbe::Inactive);
    backend.set_probe("db", FakeProbe::Active);
    let second = monitor.run_cycle().await;
    assert_eq!(second.changes.len(), 2);

    let rows = log_rows(dir.path());
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.ends_with(",monitor,127.0.0.1,status,web,,,8080,down")));
    assert!(rows
        .iter()
        .any(|r| r.ends_with(",monitor,127.0.0.1,status,db,postgresql.service,postgresql.service,0,up")));

    let snapshot = load_snapshot(&dir.path().join("status.json")).await.unwrap();
    assert_eq!(snapshot, second.statuses);

    let third = monitor.run_cycle().await;
    assert!(third.changes.is_empty());
    assert_eq!(log_rows(dir.path()).len(), 2);
}

#[tokio::test]
async fn test_unwritable_snapshot_keeps_cycle_going() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("blocker"), b"file").unwrap();
    let backend = FakeBackend::new();
    backend.set_probe("web", FakeProbe::Active);
    let monitor = monitor_in(&dir.path().join("blocker"), backend.clone(), declarations());

    let report = monitor.run_cycle().await;
    assert_eq!(report.statuses.len(), 3);
    assert!(report.statuses[0].active);
}

#[tokio::test]
async fn test_spawned_loop_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new();
    let monitor = monitor_in(dir.path(), backend.clone(), declarations());
    let shutdown = CancellationToken::new();

    let handle = monitor.clone().spawn(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(dir.path().join("status.json").exists());

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("monitor loop did not stop")
        .unwrap();
}
