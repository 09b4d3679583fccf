//! ipmsg client: discover peers on the local /24 and send them a
//! plain-text message over TCP.

mod cache;
mod config;
mod discovery;
mod send;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::{Local, TimeZone, Utc};
use clap::Parser;
use ipmsg_core::{AliasStore, Message};
use tracing_subscriber::EnvFilter;

use crate::cache::Cache;

#[derive(Debug, Parser)]
#[command(
    name = "ipmsg",
    version,
    about = "Send plain-text messages to peers on the local subnet"
)]
struct Args {
    /// Recipient address or alias. Broadcasts to every reachable host on
    /// the subnet when omitted.
    #[arg(long)]
    to: Option<String>,

    /// Recipient TCP port.
    #[arg(long)]
    port: Option<u16>,

    /// Path to the reachable-host cache file.
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Ignore the cache and rescan the subnet.
    #[arg(long)]
    rescan: bool,

    /// Path to the alias file.
    #[arg(long)]
    alias_file: Option<PathBuf>,

    /// Display name attached to the outgoing message.
    #[arg(long)]
    name: Option<String>,

    /// Print messages stored in the given log file and exit.
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ipmsg_cli=warn,ipmsg_core=warn"));
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
    if let Some(path) = &args.history {
        return print_history(path);
    }

    let cfg = config::load();
    let port = args.port.unwrap_or(cfg.port);
    let alias_path = args
        .alias_file
        .or(cfg.alias_path)
        .or_else(|| config::home_path("ipmsg/alias.txt"))
        .context("cannot resolve home directory for the alias file")?;
    if let Some(dir) = alias_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let aliases = AliasStore::new(alias_path);

    let local_ip = local_ipv4()?;

    println!("Type your message, press CTRL+D to finish");
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("failed to read message from stdin")?;

    let msg = Message {
        from: local_ip.clone(),
        alias: args.name.unwrap_or_default(),
        len: body.len() as u64,
        date: Utc::now().timestamp(),
        body,
    };

    match &args.to {
        Some(dest) => {
            let addr = resolve_target(&aliases, dest)?;
            send::send_to_one(&addr, &msg, port)
                .await
                .with_context(|| format!("failed to send to {dest}"))?;
            println!("Sent to 1 machine");
        }
        None => {
            let cache_path = args
                .cache
                .or(cfg.cache_path)
                .or_else(|| config::home_path("ipmsg/cache.json"))
                .context("cannot resolve home directory for the cache file")?;
            let cache = Cache::new(cache_path).context("failed to open host cache")?;
            let hosts = discovery::discover(&cache, &local_ip, port, args.rescan).await?;
            println!("{} reachable hosts on the subnet", hosts.len());
            let sent = send::send_to_all(&hosts, &msg, port).await?;
            println!("Sent to {sent} machines in local net");
        }
    }
    Ok(())
}

/// The machine's own IPv4 address; the scanned /24 is derived from it.
fn local_ipv4() -> anyhow::Result<String> {
    match local_ip_address::local_ip().context("failed to detect local IP address")? {
        std::net::IpAddr::V4(ip) => Ok(ip.to_string()),
        std::net::IpAddr::V6(ip) => {
            anyhow::bail!("local address {ip} is IPv6; only IPv4 subnets are scanned")
        }
    }
}

/// Accept a dotted quad as-is; anything else is looked up in the alias
/// file.
fn resolve_target(aliases: &AliasStore, dest: &str) -> anyhow::Result<String> {
    if dest.parse::<std::net::Ipv4Addr>().is_ok() {
        return Ok(dest.to_string());
    }
    aliases
        .resolve(dest)?
        .with_context(|| format!("unknown alias {dest:?}"))
}

fn print_history(path: &Path) -> anyhow::Result<()> {
    let messages = ipmsg_core::store::parse_file(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    for msg in &messages {
        let when = Local
            .timestamp_opt(msg.date, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| msg.date.to_string());
        let from = if msg.alias.is_empty() {
            msg.from.clone()
        } else {
            format!("{}({})", msg.alias, msg.from)
        };
        println!("{when} - {from}");
        println!("{}", msg.body);
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_quad_targets_bypass_the_alias_file() {
        let dir = tempfile::tempdir().unwrap();
        let aliases = AliasStore::new(dir.path().join("alias.txt"));
        let addr = resolve_target(&aliases, "192.168.1.20").unwrap();
        assert_eq!(addr, "192.168.1.20");
        // Nothing was looked up, so the file was never created.
        assert!(!dir.path().join("alias.txt").exists());
    }

    #[test]
    fn alias_targets_resolve_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let aliases = AliasStore::new(dir.path().join("alias.txt"));
        aliases.add("alex", "192.168.1.7").unwrap();
        assert_eq!(resolve_target(&aliases, "alex").unwrap(), "192.168.1.7");
        assert!(resolve_target(&aliases, "bob").is_err());
    }
}
