// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! lithiumd: the Lithium control daemon binary.
//!
//! Exit codes: 0 clean exit, 1 unrecoverable startup error, 2 crash during
//! shutdown.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use li_daemon::env;
use li_daemon::lifecycle::{self, Config};

#[derive(Parser)]
#[command(name = "lithiumd", about = "Lithium astrophotography control daemon")]
struct Args {
    /// Override the state directory (sockets, lock, logs).
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Override the config directory (profiles, scripts, components).
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Internal: serve one component library over stdio and exit.
    #[arg(long, hide = true, num_args = 2, value_names = ["LIBRARY", "ENTRY"])]
    component_host: Option<Vec<PathBuf>>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(host_args) = &args.component_host {
        return run_component_host(host_args);
    }

    if let Some(dir) = &args.state_dir {
        std::env::set_var("LITHIUM_STATE_DIR", dir);
    }
    if let Some(dir) = &args.config_dir {
        std::env::set_var("LITHIUM_CONFIG_DIR", dir);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("lithiumd: {e}");
            return ExitCode::from(1);
        }
    };
    init_tracing(&config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "cannot start runtime");
            return ExitCode::from(1);
        }
    };
    runtime.block_on(run(config))
}

fn init_tracing(config: &Config) {
    let appender = tracing_appender::rolling::daily(config.state_dir.join("logs"), "lithiumd.log");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env::log_filter()))
        .with_writer(appender)
        .with_ansi(false)
        .init();
}

async fn run(config: Config) -> ExitCode {
    let state = match lifecycle::startup(&config).await {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("lithiumd: startup failed: {e}");
            return ExitCode::from(1);
        }
    };

    let kernel = state.kernel;
    let shutdown_requested = state.listener.shutdown_requested.clone();
    let stop = state.listener.stop_token();
    let listener_task = tokio::spawn(state.listener.run());

    tokio::select! {
        _ = shutdown_requested.notified() => info!("shutdown requested by client"),
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
    }

    stop.cancel();
    let _ = listener_task.await;

    match lifecycle::shutdown(&config, &kernel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "shutdown failed");
            ExitCode::from(2)
        }
    }
}

fn run_component_host(host_args: &[PathBuf]) -> ExitCode {
    let (library, entry) = match host_args {
        [library, entry] => (library.clone(), entry.to_string_lossy().into_owned()),
        _ => {
            eprintln!("lithiumd: --component-host needs LIBRARY ENTRY");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(_) => return ExitCode::from(1),
    };
    match runtime.block_on(li_components::run_host(&library, &entry)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("lithiumd: component host failed: {e}");
            ExitCode::from(1)
        }
    }
}
