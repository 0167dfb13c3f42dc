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

//! Backend for hosts without a supported service manager

use async_trait::async_trait;
use std::time::Duration;
use svcdash_core::*;

use crate::port::{probe_port, ListenerSource};
use crate::process::{kill_custom, spawn_custom};
use crate::{CommandRunner, PlatformError, PlatformResult, ServiceBackend};

/// Port dialing and custom launches only
#[derive(Debug, Clone)]
pub struct PortOnlyBackend {
    runner: CommandRunner,
    dial_timeout: Duration,
}

impl PortOnlyBackend {
    pub fn new(runner: CommandRunner, dial_timeout: Duration) -> Self {
        PortOnlyBackend { runner, dial_timeout }
    }
}

#[async_trait]
impl ServiceBackend for PortOnlyBackend {
    fn host_os(&self) -> HostOs {
        HostOs::Other
    }

    fn detection_method(&self, decl: &ServiceDeclaration) -> DetectionMethod {
        if decl.declared_port().is_some() {
            DetectionMethod::PortCheck
        } else {
            DetectionMethod::None
        }
    }

    async fn probe(&self, decl: &ServiceDeclaration) -> PlatformResult<Probe> {
        match decl.declared_port() {
            Some(port) => {
                let active =
                    probe_port(&self.runner, ListenerSource::None, port, self.dial_timeout).await;
                Ok(Probe::new(active, DetectionMethod::PortCheck))
            }
            None => Ok(Probe::inactive(DetectionMethod::None)),
        }
    }

    async fn start(&self, decl: &ServiceDeclaration) -> PlatformResult<()> {
        match decl.custom_launch() {
            Some(run_path) => spawn_custom(run_path, &decl.run_env),
            None => Err(PlatformError::Unsupported(format!(
                "start of {}: no run_path on this platform",
                decl.name
            ))),
        }
    }

    async fn stop(&self, decl: &ServiceDeclaration) -> PlatformResult<()> {
        match decl.custom_launch() {
            Some(run_path) => kill_custom(&self.runner, HostOs::Other, run_path).await,
            None => Err(PlatformError::Unsupported(format!(
                "stop of {}: no run_path on this platform",
                decl.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unit_names_are_ignored() {
        let backend = PortOnlyBackend::new(CommandRunner::new(Duration::from_secs(1)), Duration::from_millis(50));
        let decl = ServiceDeclaration::new("launchd-only").with_service_name("com.example.agent");

        assert_eq!(backend.probe(&decl).await.unwrap(), Probe::inactive(DetectionMethod::None));
        assert!(matches!(backend.start(&decl).await, Err(PlatformError::Unsupported(_))));
    }
}
