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

//! Start/stop dispatch: target resolution, permission gate, backend call

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use svcdash_core::{non_empty, ActionKind, ServiceDeclaration};
use svcdash_platform::{PlatformError, ServiceBackend};
use tracing::{info, warn};

/// Operator-triggered control action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    Start,
    Stop,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ControlAction> for ActionKind {
    fn from(action: ControlAction) -> Self {
        match action {
            ControlAction::Start => ActionKind::Start,
            ControlAction::Stop => ActionKind::Stop,
        }
    }
}

impl FromStr for ControlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(ControlAction::Start),
            "stop" => Ok(ControlAction::Stop),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

/// Identifies the declaration a request targets; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub name: Option<String>,
    pub service_name: Option<String>,
    pub systemd_name: Option<String>,
    pub port: Option<u16>,
}

impl Selector {
    pub fn by_name(name: impl Into<String>) -> Self {
        Selector {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_systemd_name(mut self, systemd_name: impl Into<String>) -> Self {
        self.systemd_name = Some(systemd_name.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

/// Why a control request did not run
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden { reason: &'static str },

    #[error("unsupported")]
    Unsupported(String),

    #[error("{0}")]
    Command(PlatformError),
}

impl From<PlatformError> for DispatchError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Unsupported(what) => DispatchError::Unsupported(what),
            other => DispatchError::Command(other),
        }
    }
}

/// Find the declaration a selector targets.
///
/// Fields are tried one at a time in the order name, service name, systemd
/// name, port. Names compare case-insensitively.
pub fn resolve<'a>(
    selector: &Selector,
    declarations: &'a [ServiceDeclaration],
) -> Result<&'a ServiceDeclaration, DispatchError> {
    find_by_text(declarations, selector.name.as_deref(), |d| Some(d.name.as_str()))
        .or_else(|| find_by_text(declarations, selector.service_name.as_deref(), |d| d.service_name.as_deref()))
        .or_else(|| find_by_text(declarations, selector.systemd_name.as_deref(), |d| d.systemd_name.as_deref()))
        .or_else(|| {
            let port = selector.port.filter(|p| *p > 0)?;
            declarations.iter().find(|decl| decl.port == port)
        })
        .ok_or(DispatchError::NotFound)
}

fn find_by_text<'a>(
    declarations: &'a [ServiceDeclaration],
    wanted: Option<&str>,
    field: fn(&ServiceDeclaration) -> Option<&str>,
) -> Option<&'a ServiceDeclaration> {
    let wanted = non_empty(wanted)?;
    declarations.iter().find(|decl| {
        non_empty(field(decl))
            .map(|value| value.eq_ignore_ascii_case(wanted))
            .unwrap_or(false)
    })
}

/// Permission gate from the declaration's control flags
pub fn check_permission(decl: &ServiceDeclaration, action: ControlAction) -> Result<(), DispatchError> {
    if !decl.controls_enabled {
        return Err(DispatchError::Forbidden {
            reason: "controls disabled",
        });
    }
    match action {
        ControlAction::Start if !decl.start_allowed => Err(DispatchError::Forbidden {
            reason: "start not allowed",
        }),
        ControlAction::Stop if !decl.stop_allowed => Err(DispatchError::Forbidden {
            reason: "stop not allowed",
        }),
        _ => Ok(()),
    }
}

/// Outcome of one dispatch together with what it resolved to
#[derive(Debug)]
pub struct DispatchReport<'a> {
    pub action: ControlAction,
    pub target: Option<&'a ServiceDeclaration>,
    pub outcome: Result<(), DispatchError>,
}

impl DispatchReport<'_> {
    /// `ok` or `error: <reason>` as written to the action log
    pub fn result_string(&self) -> String {
        match &self.outcome {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("error: {}", e),
        }
    }
}

pub struct Dispatcher {
    backend: Arc<dyn ServiceBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn ServiceBackend>) -> Self {
        Dispatcher { backend }
    }

    pub fn backend(&self) -> &Arc<dyn ServiceBackend> {
        &self.backend
    }

    pub async fn dispatch<'a>(
        &self,
        action: ControlAction,
        selector: &Selector,
        declarations: &'a [ServiceDeclaration],
    ) -> DispatchReport<'a> {
        let target = match resolve(selector, declarations) {
            Ok(decl) => decl,
            Err(e) => {
                warn!("No service matches {:?} for {}", selector, action);
                return DispatchReport {
                    action,
                    target: None,
                    outcome: Err(e),
                };
            }
        };

        let outcome = match check_permission(target, action) {
            Ok(()) => {
                info!("Dispatching {} for service {}", action, target.name);
                let result = match action {
                    ControlAction::Start => self.backend.start(target).await,
                    ControlAction::Stop => self.backend.stop(target).await,
                };
                result.map_err(DispatchError::from)
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(()) => info!("{} {} succeeded", action, target.name),
            Err(DispatchError::Forbidden { reason }) => {
                warn!("{} {} denied: {}", action, target.name, reason)
            }
            Err(e) => warn!("{} {} failed: {}", action, target.name, e),
        }

        DispatchReport {
            action,
            target: Some(target),
            outcome,
        }
    }
}
