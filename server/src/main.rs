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

//! # svcdash
//!
//! Polls the declared services, publishes the status snapshot and audit log,
//! and performs permission-gated start/stop requests from the command line.

use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use svcdash_core::{sort_for_display, AppConfig, EnvConfig, HostOs, ServicesConfig};
use svcdash_platform::{select_backend, BackendSettings};
use svcdash_server::{
    load_snapshot, ActionLog, ControlAction, ControlRequest, ControlService, Selector, SnapshotWriter,
    StatusMonitor,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let target_args = [
        Arg::new("name")
            .short('n')
            .long("name")
            .value_name("NAME")
            .help("Service display name"),
        Arg::new("service")
            .short('s')
            .long("service")
            .value_name("SERVICE")
            .help("OS service name"),
        Arg::new("systemd")
            .long("systemd")
            .value_name("UNIT")
            .help("systemd unit name"),
        Arg::new("port")
            .short('p')
            .long("port")
            .value_name("PORT")
            .value_parser(clap::value_parser!(u16))
            .help("Declared port"),
    ];

    Command::new("svcdash")
        .version(env!("CARGO_PKG_VERSION"))
        .author("svcdash Team")
        .about("Service status monitor with permission-gated start/stop")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Application config file")
                .default_value("config.json")
                .global(true),
        )
        .subcommand(Command::new("run").about("Monitor services until interrupted (default)"))
        .subcommand(Command::new("status").about("Probe every service once and print the result"))
        .subcommand(
            Command::new("start")
                .about("Start a service")
                .args(target_args.clone()),
        )
        .subcommand(Command::new("stop").about("Stop a service").args(target_args))
        .subcommand(Command::new("snapshot").about("Print the published status snapshot"))
}

/// Everything the subcommands share
struct Runtime {
    app: AppConfig,
    env: EnvConfig,
}

impl Runtime {
    fn load(config_path: &Path) -> anyhow::Result<Self> {
        let base = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let app = if config_path.exists() {
            AppConfig::load(config_path)
                .with_context(|| format!("loading {}", config_path.display()))?
        } else {
            warn!("{} not found, using defaults", config_path.display());
            AppConfig::default()
        };

        Ok(Runtime {
            app: app.resolve_paths(&base),
            env: EnvConfig::from_env(),
        })
    }

    fn monitor(&self) -> anyhow::Result<Arc<StatusMonitor>> {
        let services = ServicesConfig::load(&self.app.services_file)
            .with_context(|| format!("loading {}", self.app.services_file.display()))?;
        info!(
            "Loaded {} services from {}",
            services.services.len(),
            self.app.services_file.display()
        );

        let backend = select_backend(HostOs::current(), BackendSettings::from(&self.env));
        Ok(Arc::new(StatusMonitor::new(
            backend,
            services.services,
            SnapshotWriter::new(self.env.export_file()),
            Arc::new(ActionLog::new(&self.app.log_file, self.app.log_max_bytes)),
            self.env.status_interval,
        )))
    }
}

async fn run(runtime: &Runtime) -> anyhow::Result<()> {
    let monitor = runtime.monitor()?;
    let shutdown = CancellationToken::new();
    let handle = monitor.spawn(shutdown.clone());

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping monitor..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    shutdown.cancel();
    handle.await.context("monitor task panicked")?;
    info!("svcdash stopped");
    Ok(())
}

async fn status(runtime: &Runtime) -> anyhow::Result<()> {
    let monitor = runtime.monitor()?;
    let report = monitor.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&report.statuses)?);
    Ok(())
}

async fn control(runtime: &Runtime, action: ControlAction, matches: &ArgMatches) -> anyhow::Result<()> {
    let selector = Selector {
        name: matches.get_one::<String>("name").cloned(),
        service_name: matches.get_one::<String>("service").cloned(),
        systemd_name: matches.get_one::<String>("systemd").cloned(),
        port: matches.get_one::<u16>("port").copied(),
    };
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();

    let service = ControlService::new(runtime.monitor()?).without_background_refresh();
    let result = service
        .handle(ControlRequest::new(action, selector).with_origin(user, "local"))
        .await;

    // Refresh before exiting so the snapshot reflects the action.
    service.monitor().run_cycle().await;

    result.with_context(|| format!("{} failed", action))?;
    println!("ok");
    Ok(())
}

async fn snapshot(runtime: &Runtime) -> anyhow::Result<()> {
    let path = runtime.env.import_file();
    let mut statuses = load_snapshot(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    sort_for_display(&mut statuses);
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let runtime = Runtime::load(&config_path)?;

    match matches.subcommand() {
        Some(("status", _)) => status(&runtime).await,
        Some(("start", sub)) => control(&runtime, ControlAction::Start, sub).await,
        Some(("stop", sub)) => control(&runtime, ControlAction::Stop, sub).await,
        Some(("snapshot", _)) => snapshot(&runtime).await,
        _ => {
            info!("Starting svcdash v{}", env!("CARGO_PKG_VERSION"));
            run(&runtime).await
        }
    }
}
