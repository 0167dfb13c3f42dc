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

//! Configuration loading: the JSON config file, the services file and
//! environment-derived runtime settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::error;

use crate::utils::{parse_duration_string, preview};
use crate::{ServiceDeclaration, SvcError, SvcResult};

pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Application configuration file (`config.json`).
///
/// Keys used only by the web front end are ignored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_services_file")]
    pub services_file: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Upper bound of the action log in bytes, 0 disables the bound
    #[serde(default)]
    pub log_max_bytes: u64,
}

fn default_services_file() -> PathBuf {
    PathBuf::from("services.json")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("log.csv")
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            services_file: default_services_file(),
            log_file: default_log_file(),
            log_max_bytes: 0,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> SvcResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| SvcError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Relative paths in the config are resolved against `base`
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.services_file.is_relative() {
            self.services_file = base.join(&self.services_file);
        }
        if self.log_file.is_relative() {
            self.log_file = base.join(&self.log_file);
        }
        self
    }
}

/// Services file (`services.json`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub services: Vec<ServiceDeclaration>,
}

impl ServicesConfig {
    pub fn load(path: &Path) -> SvcResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents).map_err(|e| {
            error!(
                "services file parse error: {}\nfile: {}\npreview: {:?}",
                e,
                path.display(),
                preview(&contents, 300)
            );
            SvcError::Config(format!("{}: {}", path.display(), e))
        })
    }

    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }
}

/// Runtime settings read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub export_path: PathBuf,
    pub export_name: String,
    pub import_path: PathBuf,
    pub import_name: String,
    pub status_interval: Duration,
    pub dial_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig::from_lookup(|_| None)
    }
}

impl EnvConfig {
    pub fn from_env() -> Self {
        EnvConfig::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    ///
    /// `IMPORT_*` default to their `EXPORT_*` counterparts. Durations that
    /// fail to parse or are zero keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let duration = |key: &str, default: Duration| {
            var(key)
                .and_then(|v| parse_duration_string(&v))
                .filter(|d| !d.is_zero())
                .unwrap_or(default)
        };

        let export_path = var("EXPORT_PATH").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        let export_name = var("EXPORT_NAME").unwrap_or_else(|| "status.json".to_string());
        let import_path = var("IMPORT_PATH").map(PathBuf::from).unwrap_or_else(|| export_path.clone());
        let import_name = var("IMPORT_NAME").unwrap_or_else(|| export_name.clone());

        EnvConfig {
            export_path,
            export_name,
            import_path,
            import_name,
            status_interval: duration("STATUS_INTERVAL", DEFAULT_STATUS_INTERVAL),
            dial_timeout: duration("PORT_DIAL_TIMEOUT", DEFAULT_DIAL_TIMEOUT),
            command_timeout: duration("COMMAND_TIMEOUT", DEFAULT_COMMAND_TIMEOUT),
        }
    }

    /// Snapshot file written by the monitor
    pub fn export_file(&self) -> PathBuf {
        self.export_path.join(&self.export_name)
    }

    /// Snapshot file read back for display
    pub fn import_file(&self) -> PathBuf {
        self.import_path.join(&self.import_name)
    }
}
