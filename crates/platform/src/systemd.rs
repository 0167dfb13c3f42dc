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

//! Linux backend driven by systemd

use async_trait::async_trait;
use std::time::Duration;
use svcdash_core::*;
use tracing::debug;

use crate::port::{probe_port, ListenerSource};
use crate::process::{kill_custom, spawn_custom};
use crate::{CommandRunner, PlatformError, PlatformResult, ServiceBackend};

/// Probes units with `systemctl is-active` and ports with `ss` plus a dial
#[derive(Debug, Clone)]
pub struct SystemdBackend {
    runner: CommandRunner,
    dial_timeout: Duration,
}

impl SystemdBackend {
    pub fn new(runner: CommandRunner, dial_timeout: Duration) -> Self {
        SystemdBackend { runner, dial_timeout }
    }

    /// Unit active-state; a missing unit or a failed query reads as inactive
    pub async fn unit_active(&self, unit: &str) -> bool {
        self.runner
            .succeeds("systemctl", &["is-active", "--quiet", unit])
            .await
    }
}

#[async_trait]
impl ServiceBackend for SystemdBackend {
    fn host_os(&self) -> HostOs {
        HostOs::Linux
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
        if let Some(unit) = decl.unit_name() {
            let active = self.unit_active(unit).await;
            debug!("systemd unit {} active={}", unit, active);
            return Ok(Probe::new(active, DetectionMethod::Systemd));
        }
        if let Some(port) = decl.declared_port() {
            let active = probe_port(&self.runner, ListenerSource::Ss, port, self.dial_timeout).await;
            return Ok(Probe::new(active, DetectionMethod::PortCheck));
        }
        Ok(Probe::inactive(DetectionMethod::None))
    }

    async fn start(&self, decl: &ServiceDeclaration) -> PlatformResult<()> {
        if let Some(run_path) = decl.custom_launch() {
            return spawn_custom(run_path, &decl.run_env);
        }
        match decl.unit_name() {
            Some(unit) => self.runner.run("systemctl", &["start", unit]).await,
            None => Err(PlatformError::Unsupported(format!(
                "start of {}: no unit or run_path",
                decl.name
            ))),
        }
    }

    async fn stop(&self, decl: &ServiceDeclaration) -> PlatformResult<()> {
        if let Some(run_path) = decl.custom_launch() {
            return kill_custom(&self.runner, HostOs::Linux, run_path).await;
        }
        match decl.unit_name() {
            Some(unit) => self.runner.run("systemctl", &["stop", unit]).await,
            None => Err(PlatformError::Unsupported(format!(
                "stop of {}: no unit or run_path",
                decl.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn backend() -> SystemdBackend {
        SystemdBackend::new(CommandRunner::new(Duration::from_secs(2)), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_bare_port_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let decl = ServiceDeclaration::new("bare").with_port(port);

        let probe = backend().probe(&decl).await.unwrap();
        assert_eq!(probe, Probe::new(true, DetectionMethod::PortCheck));
    }

    #[tokio::test]
    async fn test_missing_unit_is_inactive() {
        let decl = ServiceDeclaration::new("ghost").with_systemd_name("svcdash-no-such-unit.service");
        let probe = backend().probe(&decl).await.unwrap();
        assert_eq!(probe, Probe::inactive(DetectionMethod::Systemd));
    }

    #[tokio::test]
    async fn test_nothing_declared() {
        let decl = ServiceDeclaration::new("empty");
        let probe = backend().probe(&decl).await.unwrap();
        assert_eq!(probe, Probe::inactive(DetectionMethod::None));

        let err = backend().stop(&decl).await.unwrap_err();
        assert!(matches!(err, PlatformError::Unsupported(_)));
    }
}
