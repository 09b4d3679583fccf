//! ipmsg server: accept LAN messages over TCP and append them to a
//! plain-text log, with an audible cue per message.

mod beep;
mod config;
mod saver;
mod server;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ipmsg_core::AliasStore;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::beep::Notifier;
use crate::saver::FileSaver;
use crate::server::{MsgServer, ServeError};

#[derive(Debug, Parser)]
#[command(
    name = "ipmsg-server",
    version,
    about = "Receive ipmsg messages and append them to a plain-text log"
)]
struct Args {
    /// Bind host.
    #[arg(long)]
    host: Option<String>,

    /// Listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Path to the message log file.
    #[arg(long)]
    save_path: Option<PathBuf>,

    /// Path to the alias file.
    #[arg(long)]
    alias_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ipmsg_server=info,ipmsg_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let cfg = config::load();
    let host = args.host.unwrap_or(cfg.host);
    let port = args.port.unwrap_or(cfg.port);
    let save_path = args
        .save_path
        .or(cfg.save_path)
        .or_else(|| config::home_path("ipmsg.txt"))
        .context("cannot resolve home directory for the message log")?;
    let alias_path = args
        .alias_file
        .or(cfg.alias_path)
        .or_else(|| config::home_path("ipmsg/alias.txt"))
        .context("cannot resolve home directory for the alias file")?;
    if let Some(dir) = alias_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let saver = Arc::new(FileSaver::new(AliasStore::new(alias_path)));
    let server = MsgServer::new(saver, save_path, Notifier::spawn());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    match server.run(&host, port, shutdown_rx).await {
        Err(ServeError::Cancelled) => {
            info!("server stopped");
            Ok(())
        }
        Err(e @ ServeError::Bind { .. }) => Err(e.into()),
        Ok(()) => Ok(()),
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
