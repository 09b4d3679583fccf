//! Subnet discovery: enumerate the /24 around the local address and probe
//! every candidate with a short TCP connect attempt.
//!
//! Probes run on a fixed pool of workers pulling from a shared work queue;
//! the pool fully drains before a result is returned. Reachability means
//! "accepts a TCP connection on the service port" — the only thing worth
//! finding is another ipmsg listener, so ICMP would answer the wrong
//! question.

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::cache::{Cache, CacheError};

const WORKERS: usize = 50;
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Host suffixes probed within the /24. The network (0) and broadcast
/// (255) bytes are never probed.
const HOST_RANGE: std::ops::RangeInclusive<u8> = 1..=254;

#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("{0:?} is not an IPv4 dotted quad")]
    InvalidAddress(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Return the cached host set when it is fresh and non-empty, otherwise
/// sweep the /24 derived from `local_ip` and cache what answered.
///
/// A missing cache file means "no cached set"; a corrupt one is an error.
/// A failure to persist the sweep result does not invalidate the result.
pub async fn discover(
    cache: &Cache,
    local_ip: &str,
    port: u16,
    ignore_cache: bool,
) -> Result<Vec<String>, DiscoverError> {
    if !ignore_cache {
        match cache.read() {
            Ok(set) if set.is_fresh() && !set.ips.is_empty() => {
                debug!(hosts = set.ips.len(), "using cached host set");
                return Ok(set.ips);
            }
            Ok(_) => {}
            Err(CacheError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    let prefix = subnet_prefix(local_ip)?;
    let found = sweep(prefix, port).await;
    if let Err(e) = cache.replace(&found) {
        warn!(error = %e, "failed to update host cache");
    }
    Ok(found)
}

/// First three octets of `addr`: the /24 the sweep enumerates.
fn subnet_prefix(addr: &str) -> Result<[u8; 3], DiscoverError> {
    let ip: Ipv4Addr = addr
        .parse()
        .map_err(|_| DiscoverError::InvalidAddress(addr.to_string()))?;
    let [a, b, c, _] = ip.octets();
    Ok([a, b, c])
}

fn candidates(prefix: [u8; 3]) -> Vec<Ipv4Addr> {
    HOST_RANGE
        .map(|host| Ipv4Addr::new(prefix[0], prefix[1], prefix[2], host))
        .collect()
}

/// Probe every candidate concurrently. Results arrive in probe completion
/// order, which varies across runs.
async fn sweep(prefix: [u8; 3], port: u16) -> Vec<String> {
    let hosts = candidates(prefix);
    let (work_tx, work_rx) = mpsc::channel::<Ipv4Addr>(hosts.len());
    let work_rx = Arc::new(Mutex::new(work_rx));
    let (found_tx, mut found_rx) = mpsc::channel::<Ipv4Addr>(hosts.len());

    let mut workers = Vec::with_capacity(WORKERS);
    for _ in 0..WORKERS {
        let work_rx = work_rx.clone();
        let found_tx = found_tx.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let ip = { work_rx.lock().await.recv().await };
                let Some(ip) = ip else { break };
                if probe(ip, port).await {
                    let _ = found_tx.send(ip).await;
                }
            }
        }));
    }
    drop(found_tx);

    // Queue capacity covers the whole range, so this never blocks.
    for ip in hosts {
        let _ = work_tx.send(ip).await;
    }
    drop(work_tx);

    for worker in workers {
        let _ = worker.await;
    }

    let mut found = Vec::new();
    while let Some(ip) = found_rx.recv().await {
        found.push(ip.to_string());
    }
    found
}

/// One reachability test. Refused, unreachable and timed out all mean the
/// same thing here: nobody is listening.
async fn probe(ip: Ipv4Addr, port: u16) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((ip, port))).await,
        Ok(Ok(_))
    )
}
