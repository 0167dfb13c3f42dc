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

//! # svcdash Platform
//!
//! Liveness probes and start/stop primitives for systemd hosts, Windows
//! hosts and everything else. One [`ServiceBackend`] is selected at startup
//! from the host OS; the rest of the system only talks to that trait.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use svcdash_core::*;
use tracing::info;

pub mod command;
pub mod generic;
pub mod port;
pub mod process;
pub mod systemd;
pub mod windows;

pub use command::{CommandOutput, CommandRunner};
pub use generic::PortOnlyBackend;
pub use systemd::SystemdBackend;
pub use windows::WindowsBackend;

/// Platform result type
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Platform-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("`{command}` failed ({status}): {output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Timing knobs shared by every backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSettings {
    pub command_timeout: Duration,
    pub dial_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

impl From<&EnvConfig> for BackendSettings {
    fn from(env: &EnvConfig) -> Self {
        BackendSettings {
            command_timeout: env.command_timeout,
            dial_timeout: env.dial_timeout,
        }
    }
}

/// Probe and control capability of one host platform
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// OS this backend drives
    fn host_os(&self) -> HostOs;

    /// Detection method `probe` would use for `decl`, without any I/O
    fn detection_method(&self, decl: &ServiceDeclaration) -> DetectionMethod;

    /// Point-in-time liveness check
    async fn probe(&self, decl: &ServiceDeclaration) -> PlatformResult<Probe>;

    /// Launch the service; returns once the launch was issued
    async fn start(&self, decl: &ServiceDeclaration) -> PlatformResult<()>;

    /// Stop the service
    async fn stop(&self, decl: &ServiceDeclaration) -> PlatformResult<()>;
}

/// Pick the backend for `os`
pub fn select_backend(os: HostOs, settings: BackendSettings) -> Arc<dyn ServiceBackend> {
    info!("Selecting service backend for {}", os);

    let runner = CommandRunner::new(settings.command_timeout);
    match os {
        HostOs::Linux => Arc::new(SystemdBackend::new(runner, settings.dial_timeout)),
        HostOs::Windows => Arc::new(WindowsBackend::new(runner, settings.dial_timeout)),
        HostOs::Other => Arc::new(PortOnlyBackend::new(runner, settings.dial_timeout)),
    }
}
