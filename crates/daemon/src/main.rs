// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `conclaved`: the orchestration daemon binary (§6 `start`).

use clap::Parser;
use conclave_daemon::{lifecycle, listener, LifecycleError};
use conclave_engine::Config as EngineConfig;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conclaved", version)]
struct Args {
    /// Root directory for the socket, pidfile, and default log file
    /// (§6 `start --work-dir`).
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Override the pidfile location (§6 `start --pid-file`).
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Override the log file location (§6 `start --log-file`).
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Path to a TOML configuration file. Defaults to
    /// `<work-dir>/config.toml` if present, else built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let paths = match lifecycle::Paths::resolve(args.work_dir.clone(), args.pid_file.clone(), args.log_file.clone()) {
        Ok(p) => p,
        Err(e) => fatal(1, &e),
    };

    init_logging(&paths.log_path);

    let config_path = args.config.unwrap_or_else(|| paths.state_dir.join("config.toml"));
    let mut config = if config_path.exists() {
        match EngineConfig::load(&config_path) {
            Ok(c) => c,
            Err(e) => fatal(1, &e),
        }
    } else {
        EngineConfig::default()
    };
    if let Some(work_dir) = &args.work_dir {
        config.repo_root = work_dir.clone();
    }

    let daemon = match lifecycle::startup(config, paths).await {
        Ok(d) => d,
        Err(LifecycleError::AlreadyRunning) => fatal(2, &LifecycleError::AlreadyRunning),
        Err(e) => fatal(1, &e),
    };

    let started_at = Instant::now();
    let cancellation = tokio_util::sync::CancellationToken::new();
    let supervisor = daemon.supervisor.clone();
    let socket_path = daemon.paths.socket_path.clone();
    let accept_task = tokio::spawn(listener::accept_loop(daemon.listener, supervisor, started_at, cancellation.clone()));

    cancellation.cancelled().await;
    accept_task.abort();
    daemon.supervisor.stop().await;
    let _ = std::fs::remove_file(&socket_path);
}

fn init_logging(log_path: &std::path::Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(file) => {
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(file).with_ansi(false).init();
        }
        Err(_) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn fatal(code: i32, error: &dyn std::fmt::Display) -> ! {
    eprintln!("conclaved: {error}");
    std::process::exit(code);
}
