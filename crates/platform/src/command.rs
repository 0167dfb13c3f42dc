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

//! Bounded execution of external commands

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::{PlatformError, PlatformResult};

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stdout followed by stderr, trimmed
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        combined.push_str(self.stdout.trim());
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(stderr);
        }
        combined
    }
}

/// Runs external commands with a hard timeout.
///
/// A command still running when the timeout fires is killed.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        CommandRunner { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run to completion and capture output, whatever the exit status
    pub async fn output(&self, program: &str, args: &[&str]) -> PlatformResult<CommandOutput> {
        let rendered = render(program, args);
        debug!("Running {}", rendered);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PlatformError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(source)) => Err(PlatformError::Spawn {
                command: rendered,
                source,
            }),
            Err(_) => Err(PlatformError::Timeout {
                command: rendered,
                after: self.timeout,
            }),
        }
    }

    /// Run and require a zero exit status
    pub async fn run(&self, program: &str, args: &[&str]) -> PlatformResult<()> {
        let output = self.output(program, args).await?;
        if output.success() {
            Ok(())
        } else {
            Err(PlatformError::CommandFailed {
                command: render(program, args),
                status: output.status.to_string(),
                output: output.combined(),
            })
        }
    }

    /// Whether the command exits with status zero; any failure reads as false
    pub async fn succeeds(&self, program: &str, args: &[&str]) -> bool {
        match self.output(program, args).await {
            Ok(output) => output.success(),
            Err(e) => {
                debug!("{}", e);
                false
            }
        }
    }

    /// stdout of a successful run
    pub async fn stdout(&self, program: &str, args: &[&str]) -> PlatformResult<String> {
        let output = self.output(program, args).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(PlatformError::CommandFailed {
                command: render(program, args),
                status: output.status.to_string(),
                output: output.combined(),
            })
        }
    }
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_reports_trimmed_output() {
        let runner = CommandRunner::new(Duration::from_secs(5));
        let err = runner
            .run("sh", &["-c", "echo '  partial  '; echo 'boom' >&2; exit 3"])
            .await
            .unwrap_err();

        match err {
            PlatformError::CommandFailed { output, .. } => assert_eq!(output, "partial\nboom"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_succeeds_reflects_exit_status() {
        let runner = CommandRunner::new(Duration::from_secs(5));
        assert!(runner.succeeds("true", &[]).await);
        assert!(!runner.succeeds("false", &[]).await);
        assert!(!runner.succeeds("svcdash-no-such-binary", &[]).await);
    }

    #[tokio::test]
    async fn test_hung_command_times_out() {
        let runner = CommandRunner::new(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = runner.output("sleep", &["10"]).await.unwrap_err();

        assert!(matches!(err, PlatformError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
