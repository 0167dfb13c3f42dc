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

//! Status aggregation, change tracking and the periodic poll loop

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use svcdash_core::{ServiceDeclaration, ServiceStatus};
use svcdash_platform::ServiceBackend;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action_log::{ActionLog, ActionLogEntry};
use crate::snapshot::SnapshotWriter;

/// Probe every declaration concurrently.
///
/// Output order matches `declarations`. A failing probe yields an inactive
/// entry instead of failing the batch.
pub async fn aggregate(
    backend: &dyn ServiceBackend,
    declarations: &[ServiceDeclaration],
) -> Vec<ServiceStatus> {
    let probes = declarations.iter().map(|decl| async move {
        match backend.probe(decl).await {
            Ok(probe) => ServiceStatus::from_declaration(decl, probe),
            Err(e) => {
                warn!("Probe for service {} failed: {}", decl.name, e);
                ServiceStatus::placeholder(decl, backend.detection_method(decl))
            }
        }
    });
    join_all(probes).await
}

/// Inactive statuses for every declaration, without probing
pub fn placeholder_statuses(
    backend: &dyn ServiceBackend,
    declarations: &[ServiceDeclaration],
) -> Vec<ServiceStatus> {
    declarations
        .iter()
        .map(|decl| ServiceStatus::placeholder(decl, backend.detection_method(decl)))
        .collect()
}

/// One observed up/down transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub key: String,
    pub name: String,
    pub port: u16,
    pub unit: String,
    pub active: bool,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    pub fn state_label(&self) -> &'static str {
        if self.active {
            "up"
        } else {
            "down"
        }
    }
}

/// Last known activity per status key
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last: HashMap<String, bool>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diff(&mut self, current: &[ServiceStatus]) -> Vec<StatusChange> {
        self.diff_at(current, Utc::now())
    }

    /// First sight of a key records it silently; only flips are reported.
    /// Keys missing from `current` keep their last value.
    pub fn diff_at(&mut self, current: &[ServiceStatus], at: DateTime<Utc>) -> Vec<StatusChange> {
        let mut changes = Vec::new();
        for status in current {
            let key = status.key();
            match self.last.get_mut(&key) {
                Some(previous) if *previous == status.active => {}
                Some(previous) => {
                    *previous = status.active;
                    changes.push(StatusChange {
                        key,
                        name: status.name.clone(),
                        port: status.port,
                        unit: status.systemd_name.clone(),
                        active: status.active,
                        at,
                    });
                }
                None => {
                    self.last.insert(key, status.active);
                }
            }
        }
        changes
    }

    pub fn last_observed(&self, key: &str) -> Option<bool> {
        self.last.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

/// Result of one monitoring pass
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub statuses: Vec<ServiceStatus>,
    pub changes: Vec<StatusChange>,
}

/// Drives aggregation, change logging and snapshot publication
pub struct StatusMonitor {
    backend: Arc<dyn ServiceBackend>,
    declarations: Vec<ServiceDeclaration>,
    tracker: Mutex<ChangeTracker>,
    snapshot: SnapshotWriter,
    action_log: Arc<ActionLog>,
    interval: Duration,
}

impl StatusMonitor {
    pub fn new(
        backend: Arc<dyn ServiceBackend>,
        declarations: Vec<ServiceDeclaration>,
        snapshot: SnapshotWriter,
        action_log: Arc<ActionLog>,
        interval: Duration,
    ) -> Self {
        StatusMonitor {
            backend,
            declarations,
            tracker: Mutex::new(ChangeTracker::new()),
            snapshot,
            action_log,
            interval,
        }
    }

    pub fn backend(&self) -> &Arc<dyn ServiceBackend> {
        &self.backend
    }

    pub fn declarations(&self) -> &[ServiceDeclaration] {
        &self.declarations
    }

    pub fn snapshot(&self) -> &SnapshotWriter {
        &self.snapshot
    }

    pub fn action_log(&self) -> &Arc<ActionLog> {
        &self.action_log
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One full pass: probe, diff, audit flips, publish the snapshot.
    ///
    /// The tracker stays locked for the whole pass so concurrent passes
    /// cannot report the same flip twice or publish out of order.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut tracker = self.tracker.lock().await;

        let statuses = aggregate(self.backend.as_ref(), &self.declarations).await;
        let changes = tracker.diff(&statuses);

        for change in &changes {
            info!("Service {} is {}", change.name, change.state_label());
            if let Err(e) = self
                .action_log
                .append(&ActionLogEntry::status_change(change))
                .await
            {
                warn!("Failed to record status change for {}: {}", change.name, e);
            }
        }

        if let Err(e) = self.snapshot.write(&statuses).await {
            warn!("Failed to write status snapshot: {}", e);
        }

        debug!(
            "Monitoring cycle done: {} services, {} changes",
            statuses.len(),
            changes.len()
        );
        CycleReport { statuses, changes }
    }

    /// Run [`run_cycle`](Self::run_cycle) every interval until `shutdown` fires
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Status monitor started for {} services every {:?}",
                self.declarations.len(),
                self.interval
            );

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        self.run_cycle().await;
                    }
                }
            }

            info!("Status monitor stopped");
        })
    }
}
