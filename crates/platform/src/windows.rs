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

//! Windows backend: service manager state with a process-list fallback.
//!
//! Many Windows "services" are plain executables rather than registered
//! services, so a service that `sc` does not report as running is also
//! looked up in the process list. The broad match against command line,
//! description and window title can report false positives for common
//! names; that tradeoff is kept on purpose.

use async_trait::async_trait;
use std::time::Duration;
use svcdash_core::*;
use tracing::debug;

use crate::port::{probe_port, ListenerSource};
use crate::process::{kill_custom, spawn_custom};
use crate::{CommandRunner, PlatformError, PlatformResult, ServiceBackend};

/// Drives `sc`, `tasklist`, `taskkill` and PowerShell
#[derive(Debug, Clone)]
pub struct WindowsBackend {
    runner: CommandRunner,
    dial_timeout: Duration,
}

impl WindowsBackend {
    pub fn new(runner: CommandRunner, dial_timeout: Duration) -> Self {
        WindowsBackend { runner, dial_timeout }
    }

    /// `sc query` reports the service as running
    pub async fn service_running(&self, name: &str) -> bool {
        match self.runner.stdout("sc", &["query", name]).await {
            Ok(output) => sc_reports_running(&output),
            Err(e) => {
                debug!("sc query {}: {}", name, e);
                false
            }
        }
    }

    /// Any process matches `name`: exact image name, then the verbose task
    /// list, then a PowerShell `Get-Process` filter
    pub async fn process_running(&self, name: &str) -> bool {
        if is_exe(name) {
            let filter = format!("IMAGENAME eq {}", name);
            if let Ok(output) = self
                .runner
                .stdout("tasklist", &["/FI", &filter, "/FO", "CSV", "/NH"])
                .await
            {
                if tasklist_has_image(&output, name) {
                    return true;
                }
            }
        }

        if let Ok(output) = self
            .runner
            .stdout("tasklist", &["/V", "/FO", "CSV", "/NH"])
            .await
        {
            if tasklist_mentions(&output, name) {
                return true;
            }
        }

        let script = get_process_script(name);
        self.runner
            .succeeds("powershell", &["-NoProfile", "-Command", &script])
            .await
    }
}

#[async_trait]
impl ServiceBackend for WindowsBackend {
    fn host_os(&self) -> HostOs {
        HostOs::Windows
    }

    fn detection_method(&self, decl: &ServiceDeclaration) -> DetectionMethod {
        if decl.unit_name().is_some() {
            DetectionMethod::WindowsService
        } else if decl.declared_port().is_some() {
            DetectionMethod::PortCheck
        } else {
            DetectionMethod::None
        }
    }

    async fn probe(&self, decl: &ServiceDeclaration) -> PlatformResult<Probe> {
        if let Some(name) = decl.unit_name() {
            if self.service_running(name).await {
                return Ok(Probe::new(true, DetectionMethod::WindowsService));
            }
            if self.process_running(name).await {
                return Ok(Probe::new(true, DetectionMethod::WindowsProcess));
            }
            return Ok(Probe::inactive(DetectionMethod::WindowsService));
        }
        if let Some(port) = decl.declared_port() {
            let active =
                probe_port(&self.runner, ListenerSource::Netstat, port, self.dial_timeout).await;
            return Ok(Probe::new(active, DetectionMethod::PortCheck));
        }
        Ok(Probe::inactive(DetectionMethod::None))
    }

    async fn start(&self, decl: &ServiceDeclaration) -> PlatformResult<()> {
        if let Some(run_path) = decl.custom_launch() {
            return spawn_custom(run_path, &decl.run_env);
        }
        match decl.unit_name() {
            Some(name) if is_exe(name) => {
                let script = format!("Start-Process -FilePath '{}'", escape_single_quotes(name));
                self.runner
                    .run("powershell", &["-NoProfile", "-Command", &script])
                    .await
            }
            Some(name) => self.runner.run("sc", &["start", name]).await,
            None => Err(PlatformError::Unsupported(format!(
                "start of {}: no service name or run_path",
                decl.name
            ))),
        }
    }

    async fn stop(&self, decl: &ServiceDeclaration) -> PlatformResult<()> {
        if let Some(run_path) = decl.custom_launch() {
            return kill_custom(&self.runner, HostOs::Windows, run_path).await;
        }
        match decl.unit_name() {
            Some(name) if is_exe(name) => self.runner.run("taskkill", &["/IM", name, "/F"]).await,
            Some(name) => self.runner.run("sc", &["stop", name]).await,
            None => Err(PlatformError::Unsupported(format!(
                "stop of {}: no service name or run_path",
                decl.name
            ))),
        }
    }
}

/// Name refers to an executable image rather than a registered service
pub fn is_exe(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".exe")
}

/// `sc query` output with a RUNNING state line
pub fn sc_reports_running(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("state") && lower.contains("running")
}

/// CSV `tasklist` output has a row whose image column is exactly `image`
pub fn tasklist_has_image(output: &str, image: &str) -> bool {
    let prefix = format!("\"{}\",", image.to_lowercase());
    output
        .lines()
        .any(|line| line.trim().to_lowercase().starts_with(&prefix))
}

/// Any row of the verbose task list mentions `needle`
pub fn tasklist_mentions(output: &str, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    output
        .lines()
        .any(|line| line.to_lowercase().contains(&needle))
}

fn escape_single_quotes(value: &str) -> String {
    value.replace('\'', "''")
}

/// PowerShell filter matching window title, description, path or process
/// name; exits 0 when something matches
pub fn get_process_script(name: &str) -> String {
    format!(
        "$n='{}'; $p = Get-Process | Where-Object {{ $_.MainWindowTitle -like \"*${{n}}*\" -or $_.Description -like \"*${{n}}*\" -or $_.Path -like \"*${{n}}*\" -or $_.ProcessName -like \"*${{n}}*\" }}; if ($p) {{ exit 0 }} else {{ exit 1 }}",
        escape_single_quotes(name)
    )
}
