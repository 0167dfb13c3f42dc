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

//! Custom-launch processes declared through `run_path`

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

use crate::{CommandRunner, PlatformError, PlatformResult};
use svcdash_core::HostOs;

/// Spawn `run_path` detached from this process.
///
/// The working directory is the executable's own directory and `env`
/// overrides the inherited environment. Returns as soon as the process
/// exists; readiness is left to the next probe.
pub fn spawn_custom(run_path: &Path, env: &BTreeMap<String, String>) -> PlatformResult<()> {
    let mut command = Command::new(run_path);
    if let Some(dir) = run_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        command.current_dir(dir);
    }
    command
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let child = command.spawn().map_err(|source| PlatformError::Spawn {
        command: run_path.display().to_string(),
        source,
    })?;
    info!(
        "Launched {} (pid {})",
        run_path.display(),
        child.id().map_or_else(|| "?".to_string(), |pid| pid.to_string())
    );
    Ok(())
}

/// Forcefully terminate processes launched from `run_path`
pub async fn kill_custom(runner: &CommandRunner, os: HostOs, run_path: &Path) -> PlatformResult<()> {
    let base = executable_name(run_path)?;
    match os {
        HostOs::Windows => runner.run("taskkill", &["/IM", &base, "/F"]).await,
        _ => {
            let full = run_path.to_string_lossy();
            match runner.run("pkill", &["-f", &full]).await {
                Ok(()) => Ok(()),
                Err(_) => runner.run("killall", &[&base]).await,
            }
        }
    }
}

fn executable_name(run_path: &Path) -> PlatformResult<String> {
    run_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            PlatformError::Unsupported(format!("no executable name in {}", run_path.display()))
        })
}
