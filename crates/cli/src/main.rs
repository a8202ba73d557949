// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `conclave`: the CLI front-end for the orchestration daemon (§6).

mod client;
mod env;
mod exit_error;

use clap::{Parser, Subcommand};
use client::DaemonClient;
use conclave_wire::{Request, Response};
use exit_error::ExitError;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "conclave", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon (§6 `start`).
    Start {
        #[arg(long)]
        work_dir: Option<PathBuf>,
        #[arg(long)]
        pid_file: Option<PathBuf>,
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Stop the daemon, draining in-flight work first.
    Stop {
        /// Skip the drain wait and request an immediate shutdown.
        #[arg(long)]
        no_drain: bool,
    },
    /// Print daemon status (mode, agent count, available PRs, sync times).
    Status {
        #[arg(long)]
        verbose: bool,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Start { work_dir, pid_file, log_file } => start(work_dir, pid_file, log_file).await,
        Command::Stop { no_drain } => stop(no_drain).await,
        Command::Status { verbose, json } => status(verbose, json).await,
    };

    if let Err(e) = result {
        eprintln!("conclave: {e}");
        std::process::exit(e.code);
    }
}

async fn start(work_dir: Option<PathBuf>, pid_file: Option<PathBuf>, log_file: Option<PathBuf>) -> Result<(), ExitError> {
    if DaemonClient::connect(work_dir.as_ref()).await.is_ok() {
        return Err(ExitError::new(2, "daemon is already running"));
    }

    let exe = find_daemon_binary()?;
    let mut command = std::process::Command::new(exe);
    if let Some(dir) = &work_dir {
        command.arg("--work-dir").arg(dir);
    }
    if let Some(pid) = &pid_file {
        command.arg("--pid-file").arg(pid);
    }
    if let Some(log) = &log_file {
        command.arg("--log-file").arg(log);
    }
    // Detach: the daemon outlives this `start` invocation.
    command.stdin(std::process::Stdio::null()).stdout(std::process::Stdio::null()).stderr(std::process::Stdio::null());
    let mut child = command.spawn().map_err(|e| ExitError::new(1, format!("failed to spawn daemon: {e}")))?;

    for _ in 0..50 {
        if DaemonClient::connect(work_dir.as_ref()).await.is_ok() {
            println!("conclave daemon started");
            return Ok(());
        }
        if let Ok(Some(status)) = child.try_wait() {
            return Err(ExitError::new(1, format!("daemon exited during startup: {status}")));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(ExitError::new(1, "daemon did not become reachable within the startup window"))
}

async fn stop(no_drain: bool) -> Result<(), ExitError> {
    let mut client = DaemonClient::connect(None).await?;
    match client.call(Request::Shutdown { drain: !no_drain }).await? {
        Response::ShuttingDown | Response::Ok => {}
        other => return Err(ExitError::new(1, format!("unexpected reply to shutdown: {other:?}"))),
    }

    for _ in 0..100 {
        if DaemonClient::connect(None).await.is_err() {
            println!("conclave daemon stopped");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(ExitError::new(3, "graceful shutdown did not complete within the timeout"))
}

async fn status(verbose: bool, json: bool) -> Result<(), ExitError> {
    let mut client = DaemonClient::connect(None).await?;
    match client.call(Request::Status { verbose }).await? {
        Response::Status(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report).map_err(|e| ExitError::new(1, e.to_string()))?);
            } else {
                println!("mode: {}", report.mode);
                println!("agents: {}", report.agent_count);
                println!("available PRs: {}", report.available_pr_count);
                println!("last display sync: {:?}", report.last_display_sync_ms);
                println!("last reconcile: {:?}", report.last_reconcile_ms);
                if verbose {
                    for agent in &report.agents {
                        println!("  agent {} [{}] {} assigned={:?}", agent.agent_id, agent.role, agent.status, agent.assigned_pr);
                    }
                    for pr in &report.available_prs {
                        println!("  pr {} ({}) {} priority={}", pr.pr_id, pr.title, pr.cold_state, pr.priority);
                    }
                    for failure in &report.recent_event_failures {
                        println!("  event failure: {failure}");
                    }
                }
            }
            Ok(())
        }
        other => Err(ExitError::new(1, format!("unexpected reply to status: {other:?}"))),
    }
}

fn find_daemon_binary() -> Result<PathBuf, ExitError> {
    let exe = std::env::current_exe().map_err(|e| ExitError::new(1, e.to_string()))?;
    let dir = exe.parent().ok_or_else(|| ExitError::new(1, "could not locate the directory of the running executable"))?;
    let candidate = dir.join("conclaved");
    if candidate.exists() {
        return Ok(candidate);
    }
    Ok(PathBuf::from("conclaved"))
}
