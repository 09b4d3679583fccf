//! Client send paths: best-effort broadcast to a set of hosts, and the
//! strict single-target path.

use std::time::Duration;

use ipmsg_core::{encode_request, EncodeError, Message};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Broadcast dials are short; anything not answering quickly is skipped.
const DIAL_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: std::io::Error },
    #[error("failed to write to {addr}: {source}")]
    Write { addr: String, source: std::io::Error },
}

/// Write `msg` to every target, skipping the ones that do not accept a
/// connection within the dial timeout. Returns how many were counted as
/// delivered.
///
/// A successful connect is counted even when the write that follows
/// fails; the count has always meant "machines that answered the dial".
pub async fn send_to_all(targets: &[String], msg: &Message, port: u16) -> Result<usize, SendError> {
    let frame = encode_request(msg)?;
    let mut sent = 0usize;
    for addr in targets {
        let mut stream = match timeout(DIAL_TIMEOUT, TcpStream::connect((addr.as_str(), port))).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "skipping unreachable target");
                continue;
            }
            Err(_) => {
                debug!(%addr, "skipping target: dial timed out");
                continue;
            }
        };
        if let Err(e) = stream.write_all(&frame).await {
            debug!(%addr, error = %e, "write after connect failed");
        }
        sent += 1;
    }
    Ok(sent)
}

/// Write `msg` to one explicit target. Connect and write failures are
/// distinct errors, both fatal to the call.
pub async fn send_to_one(addr: &str, msg: &Message, port: u16) -> Result<(), SendError> {
    let frame = encode_request(msg)?;
    let mut stream = TcpStream::connect((addr, port))
        .await
        .map_err(|source| SendError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    stream
        .write_all(&frame)
        .await
        .map_err(|source| SendError::Write {
            addr: addr.to_string(),
            source,
        })?;
    Ok(())
}
