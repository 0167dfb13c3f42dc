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

//! Core types for svcdash

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::utils::non_empty;

/// Operating system family a backend is selected for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    Linux,
    Windows,
    Other,
}

impl HostOs {
    /// Detect the OS this process runs on
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => HostOs::Linux,
            "windows" => HostOs::Windows,
            _ => HostOs::Other,
        }
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostOs::Linux => "linux",
            HostOs::Windows => "windows",
            HostOs::Other => "other",
        };
        f.write_str(name)
    }
}

/// Operator-authored description of a monitorable service.
///
/// Field names on the wire match the services file format, so the
/// permission flags are read from `controls`, `controls_run` and
/// `controls_shut`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDeclaration {
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub show_port: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systemd_name: Option<String>,
    #[serde(default, rename = "controls")]
    pub controls_enabled: bool,
    #[serde(default, rename = "controls_run")]
    pub start_allowed: bool,
    #[serde(default, rename = "controls_shut")]
    pub stop_allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub run_env: BTreeMap<String, String>,
}

impl ServiceDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        ServiceDeclaration {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_systemd_name(mut self, systemd_name: impl Into<String>) -> Self {
        self.systemd_name = Some(systemd_name.into());
        self
    }

    pub fn with_run_path(mut self, run_path: impl Into<PathBuf>) -> Self {
        self.run_path = Some(run_path.into());
        self
    }

    pub fn with_controls(mut self, enabled: bool, start: bool, stop: bool) -> Self {
        self.controls_enabled = enabled;
        self.start_allowed = start;
        self.stop_allowed = stop;
        self
    }

    /// OS service identifier: `service_name`, falling back to `systemd_name`
    pub fn unit_name(&self) -> Option<&str> {
        non_empty(self.service_name.as_deref()).or_else(|| non_empty(self.systemd_name.as_deref()))
    }

    /// Declared port, if any
    pub fn declared_port(&self) -> Option<u16> {
        (self.port > 0).then_some(self.port)
    }

    /// Executable used for custom launches, if declared
    pub fn custom_launch(&self) -> Option<&Path> {
        self.run_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Composite identity key used by the change tracker
    pub fn status_key(&self) -> String {
        status_key(&self.name, self.port, self.unit_name().unwrap_or(""))
    }
}

/// Builds the `name|port|unit` identity key
pub fn status_key(name: &str, port: u16, unit: &str) -> String {
    format!("{}|{}|{}", name, port, unit)
}

/// How liveness of a service was determined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    PortCheck,
    Systemd,
    WindowsService,
    WindowsProcess,
    #[default]
    None,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::PortCheck => "port-check",
            DetectionMethod::Systemd => "systemd",
            DetectionMethod::WindowsService => "windows-service",
            DetectionMethod::WindowsProcess => "windows-process",
            DetectionMethod::None => "none",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub active: bool,
    pub method: DetectionMethod,
}

impl Probe {
    pub fn new(active: bool, method: DetectionMethod) -> Self {
        Probe { active, method }
    }

    pub fn inactive(method: DetectionMethod) -> Self {
        Probe::new(false, method)
    }
}

/// Status entry derived from a declaration on every poll pass.
///
/// Keys are PascalCase because external snapshot readers already consume
/// that shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceStatus {
    pub port: u16,
    pub name: String,
    pub link: String,
    pub image: String,
    pub show_port: bool,
    pub systemd_name: String,
    pub is_systemd: bool,
    pub active: bool,
    pub detection_method: DetectionMethod,
    pub controls: bool,
    pub controls_run: bool,
    pub controls_shut: bool,
}

impl ServiceStatus {
    pub fn from_declaration(decl: &ServiceDeclaration, probe: Probe) -> Self {
        ServiceStatus {
            port: decl.port,
            name: decl.name.clone(),
            link: decl.link.clone().unwrap_or_default(),
            image: decl.image.clone().unwrap_or_default(),
            show_port: decl.show_port,
            systemd_name: decl.unit_name().unwrap_or_default().to_string(),
            is_systemd: probe.method == DetectionMethod::Systemd,
            active: probe.active,
            detection_method: probe.method,
            controls: decl.controls_enabled,
            controls_run: decl.start_allowed,
            controls_shut: decl.stop_allowed,
        }
    }

    /// Inactive entry shown before the first live pass completes
    pub fn placeholder(decl: &ServiceDeclaration, method: DetectionMethod) -> Self {
        ServiceStatus::from_declaration(decl, Probe::inactive(method))
    }

    pub fn key(&self) -> String {
        status_key(&self.name, self.port, &self.systemd_name)
    }
}

/// Orders statuses the way the dashboard lists them: active first, then
/// inactive, each group by name.
pub fn sort_for_display(statuses: &mut [ServiceStatus]) {
    statuses.sort_by(|a, b| b.active.cmp(&a.active).then_with(|| a.name.cmp(&b.name)));
}

/// Kind of an audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Start,
    Stop,
    Status,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Status => "status",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
