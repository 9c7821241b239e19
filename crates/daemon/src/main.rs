// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stoker Daemon (stokerd)
//!
//! Single-leader task orchestrator process: loads a JSON config,
//! recovers state from the WAL, dispatches tasks to registered
//! services, and serves the loopback admin endpoint.
//!
//! Exit codes: 0 on graceful shutdown, 1 on startup failure (lock
//! contention, unreadable WAL, invalid config).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stoker_core::OrchestratorConfig;
use stoker_daemon::admin::AdminServer;
use stoker_daemon::services;
use stoker_engine::{Orchestrator, StartError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    let config_path = match std::env::args().nth(1) {
        Some(arg) => match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("stokerd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("stokerd {}", env!("CARGO_PKG_VERSION"));
                println!("Stoker Daemon - durable task orchestrator");
                println!();
                println!("USAGE:");
                println!("    stokerd <config.json>");
                println!();
                println!("The config file must at least set \"wal_path\". The daemon");
                println!("acquires the leader lock, recovers task state from the WAL,");
                println!("and serves the admin endpoint if \"admin_port\" is set.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => PathBuf::from(arg),
        },
        None => {
            eprintln!("error: missing config file argument");
            eprintln!("Usage: stokerd <config.json>");
            std::process::exit(1);
        }
    };

    let config = match OrchestratorConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = setup_logging(&config)?;

    info!(config = %config_path.display(), "starting stokerd");

    let admin_port = config.admin_port;

    let orch = Arc::new(Orchestrator::new(config)?);
    services::register_builtins(orch.as_ref());

    match orch.start().await {
        Ok(()) => {}
        Err(StartError::LockHeld(path)) => {
            // Another orchestrator owns the WAL - print a human-readable
            // message instead of a raw debug error.
            report_lock_held(&path);
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "failed to start orchestrator");
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }

    let admin = match admin_port {
        Some(port) => Some(AdminServer::bind(Arc::clone(&orch), port).await?),
        None => None,
    };
    if let Some(admin) = &admin {
        info!(port = admin.port(), "admin endpoint ready");
    }

    // Signal ready for parent process (CLI or supervisor waiting on startup)
    println!("READY");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    // Drain admin before stopping dispatch so in-flight overrides land
    if let Some(admin) = admin {
        admin.stop().await;
    }
    orch.stop().await;

    info!("daemon stopped");
    Ok(())
}

/// Print a friendly lock-contention message with the holder's PID.
fn report_lock_held(lock_path: &Path) {
    let pid = std::fs::read_to_string(lock_path)
        .unwrap_or_default()
        .trim()
        .to_string();

    eprintln!("stokerd is already running");
    if !pid.is_empty() {
        eprintln!("  pid: {pid}");
    }
    eprintln!("  lock: {}", lock_path.display());
}

fn setup_logging(
    config: &OrchestratorConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.log_path {
        Some(log_path) => {
            let parent = log_path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(parent)?;
            let file_name = log_path
                .file_name()
                .ok_or("log_path has no file name")?;
            let file_appender = tracing_appender::rolling::never(parent, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}
