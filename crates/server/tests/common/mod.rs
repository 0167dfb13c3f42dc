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

//! Shared fixtures for server integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use svcdash_core::{DetectionMethod, HostOs, Probe, ServiceDeclaration};
use svcdash_platform::{PlatformError, PlatformResult, ServiceBackend};
use svcdash_server::{ActionLog, SnapshotWriter, StatusMonitor};

/// Scripted probe outcome for one service name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeProbe {
    Active,
    Inactive,
    Fail,
}

/// In-memory backend that records control calls
#[derive(Default)]
pub struct FakeBackend {
    probes: Mutex<HashMap<String, FakeProbe>>,
    calls: Mutex<Vec<(String, String)>>,
    control_error: Mutex<Option<String>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_probe(&self, name: &str, probe: FakeProbe) {
        self.probes.lock().unwrap().insert(name.to_string(), probe);
    }

    /// Make every start/stop fail with a command error carrying `output`
    pub fn fail_controls(&self, output: &str) {
        *self.control_error.lock().unwrap() = Some(output.to_string());
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn control(&self, action: &str, decl: &ServiceDeclaration) -> PlatformResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), decl.name.clone()));
        match self.control_error.lock().unwrap().clone() {
            Some(output) => Err(PlatformError::CommandFailed {
                command: format!("fake {}", action),
                status: "exit status: 1".to_string(),
                output,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ServiceBackend for FakeBackend {
    fn host_os(&self) -> HostOs {
        HostOs::Other
    }

    fn detection_method(&self, decl: &ServiceDeclaration) -> DetectionMethod {
        if decl.unit_name().is_some() {
            DetectionMethod::Systemd
        } else if decl.declared_port().is_some() {
            DetectionMethod::PortCheck
        } else {
            DetectionMethod::None
        }
    }

    async fn probe(&self, decl: &ServiceDeclaration) -> PlatformResult<Probe> {
        let scripted = self
            .probes
            .lock()
            .unwrap()
            .get(&decl.name)
            .copied()
            .unwrap_or(FakeProbe::Inactive);
        let method = self.detection_method(decl);
        match scripted {
            FakeProbe::Active => Ok(Probe::new(true, method)),
            FakeProbe::Inactive => Ok(Probe::inactive(method)),
            FakeProbe::Fail => Err(PlatformError::Timeout {
                command: "fake probe".to_string(),
                after: Duration::from_millis(1),
            }),
        }
    }

    async fn start(&self, decl: &ServiceDeclaration) -> PlatformResult<()> {
        self.control("start", decl)
    }

    async fn stop(&self, decl: &ServiceDeclaration) -> PlatformResult<()> {
        self.control("stop", decl)
    }
}

/// Monitor writing its snapshot and log under `dir`
pub fn monitor_in(
    dir: &Path,
    backend: Arc<dyn ServiceBackend>,
    declarations: Vec<ServiceDeclaration>,
) -> Arc<StatusMonitor> {
    Arc::new(StatusMonitor::new(
        backend,
        declarations,
        SnapshotWriter::new(dir.join("status.json")),
        Arc::new(ActionLog::new(dir.join("log.csv"), 0)),
        Duration::from_millis(50),
    ))
}

/// Data rows of the action log, newest first
pub fn log_rows(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("log.csv"))
        .unwrap_or_default()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}
