//! TCP server loop: accept connections until cancelled, one handler task
//! per connection, fixed idle read deadline. One bad connection never
//! affects another; only a bind failure is fatal.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ipmsg_core::{decode_request, encode_response, wire::FRAME_END, Message, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info};

use crate::beep::Notifier;

/// Idle read deadline for one connection.
const READ_DEADLINE: Duration = Duration::from_secs(60);
const READ_CHUNK: usize = 1024;

/// Persistence collaborator: stores one received message. An error is
/// fatal to the connection that carried the message, never to the server.
pub trait MsgSaver: Send + Sync {
    fn save(&self, path: &Path, msg: &Message) -> anyhow::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// The listening port could not be acquired. Fatal to the process.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    /// The expected outcome of a graceful shutdown.
    #[error("server cancelled")]
    Cancelled,
}

/// The receiving side: owns the persistence collaborator, the log path
/// and the notification handle shared by every connection handler.
#[derive(Clone)]
pub struct MsgServer {
    saver: Arc<dyn MsgSaver>,
    save_path: PathBuf,
    notifier: Notifier,
}

impl MsgServer {
    pub fn new(saver: Arc<dyn MsgSaver>, save_path: PathBuf, notifier: Notifier) -> Self {
        Self {
            saver,
            save_path,
            notifier,
        }
    }

    /// Bind and serve until `shutdown` flips. Blocks the caller; the only
    /// returns are `Bind` when the listener cannot be acquired and
    /// `Cancelled` once shutdown is observed.
    pub async fn run(
        &self,
        host: &str,
        port: u16,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServeError> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServeError> {
        match listener.local_addr() {
            Ok(addr) => info!(%addr, "listening"),
            Err(_) => info!("listening"),
        }
        loop {
            if *shutdown.borrow() {
                return Err(ServeError::Cancelled);
            }
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        return Err(ServeError::Cancelled);
                    }
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let server = self.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        server.handle_conn(stream, peer, shutdown).await;
                    });
                }
            }
        }
    }

    /// One connection: read a frame, decode, persist, respond, close.
    /// Every failure answers with an error response and ends only this
    /// connection.
    async fn handle_conn(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let deadline = Instant::now() + READ_DEADLINE;
        let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if *shutdown.borrow() {
                return;
            }
            tokio::select! {
                res = shutdown.changed() => {
                    // Server-wide shutdown: drop the socket, no response.
                    if res.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                res = timeout_at(deadline, stream.read(&mut chunk)) => match res {
                    Err(_) => {
                        self.respond_error(&mut stream, peer, "failed read request: deadline exceeded".to_string())
                            .await;
                        return;
                    }
                    Ok(Err(e)) => {
                        self.respond_error(&mut stream, peer, format!("failed read request: {}", e))
                            .await;
                        return;
                    }
                    Ok(Ok(0)) => {
                        self.respond_error(
                            &mut stream,
                            peer,
                            "failed read request: connection closed before terminator".to_string(),
                        )
                        .await;
                        return;
                    }
                    Ok(Ok(n)) => {
                        buf.extend_from_slice(&chunk[..n]);
                        if buf.contains(&FRAME_END) {
                            break;
                        }
                    }
                },
            }
        }

        let msg = match decode_request(&buf) {
            Ok(msg) => msg,
            Err(e) => {
                self.respond_error(&mut stream, peer, format!("failed parse request: {}", e))
                    .await;
                return;
            }
        };

        if let Err(e) = self.saver.save(&self.save_path, &msg) {
            self.respond_error(&mut stream, peer, format!("failed save message: {:#}", e))
                .await;
            return;
        }

        let _ = stream.write_all(&encode_response(&Response::ok())).await;
        // Response is already on the wire; the cue is best-effort.
        self.notifier.notify();
    }

    async fn respond_error(&self, stream: &mut TcpStream, peer: SocketAddr, detail: String) {
        error!(%peer, "{}", detail);
        let resp = Response::err(detail);
        let _ = stream.write_all(&encode_response(&resp)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipmsg_core::{decode_response, encode_request};
    use std::sync::Mutex;

    struct RecordingSaver {
        saved: Mutex<Vec<Message>>,
        fail: bool,
    }

    impl RecordingSaver {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                saved: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn saved(&self) -> Vec<Message> {
            self.saved.lock().unwrap().clone()
        }
    }

    impl MsgSaver for RecordingSaver {
        fn save(&self, _path: &Path, msg: &Message) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("disk full");
            }
            self.saved.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    struct Running {
        addr: SocketAddr,
        shutdown: watch::Sender<bool>,
        task: tokio::task::JoinHandle<Result<(), ServeError>>,
    }

    async fn start(saver: Arc<RecordingSaver>) -> Running {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let server = MsgServer::new(saver, PathBuf::from("unused"), Notifier::spawn());
        let task = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });
        Running {
            addr,
            shutdown,
            task,
        }
    }

    async fn exchange(addr: SocketAddr, bytes: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(bytes).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut resp = Vec::new();
        stream.read_to_end(&mut resp).await.unwrap();
        resp
    }

    fn sample() -> Message {
        Message {
            from: "127.0.0.1".to_string(),
            alias: String::new(),
            len: 11,
            date: 1_700_000_000,
            body: "hello\nworld".to_string(),
        }
    }

    #[tokio::test]
    async fn valid_frame_is_persisted_and_acknowledged() {
        let saver = RecordingSaver::new(false);
        let running = start(saver.clone()).await;

        let frame = encode_request(&sample()).unwrap();
        let resp = decode_response(&exchange(running.addr, &frame).await).unwrap();
        assert!(resp.success);
        assert_eq!(resp.error, None);

        let saved = saver.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].body, "hello\nworld");
        assert_eq!(saved[0].alias, "");

        running.shutdown.send(true).unwrap();
        assert!(matches!(
            running.task.await.unwrap(),
            Err(ServeError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn missing_terminator_fails_without_persistence() {
        let saver = RecordingSaver::new(false);
        let running = start(saver.clone()).await;

        let mut frame = encode_request(&sample()).unwrap();
        frame.pop();
        let resp = decode_response(&exchange(running.addr, &frame).await).unwrap();
        assert!(!resp.success);
        assert!(!resp.error.unwrap().is_empty());
        assert!(saver.saved().is_empty());

        running.shutdown.send(true).unwrap();
        let _ = running.task.await;
    }

    #[tokio::test]
    async fn unparseable_frame_is_rejected() {
        let saver = RecordingSaver::new(false);
        let running = start(saver.clone()).await;

        let resp = decode_response(&exchange(running.addr, b"garbage\x00").await).unwrap();
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("failed parse request"));
        assert!(saver.saved().is_empty());

        running.shutdown.send(true).unwrap();
        let _ = running.task.await;
    }

    #[tokio::test]
    async fn persistence_failure_is_connection_fatal_only() {
        let saver = RecordingSaver::new(true);
        let running = start(saver.clone()).await;

        let frame = encode_request(&sample()).unwrap();
        let resp = decode_response(&exchange(running.addr, &frame).await).unwrap();
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("failed save message"));

        // The server keeps accepting after a failed connection.
        let resp = decode_response(&exchange(running.addr, &frame).await).unwrap();
        assert!(!resp.success);

        running.shutdown.send(true).unwrap();
        let _ = running.task.await;
    }

    #[tokio::test]
    async fn one_bad_connection_does_not_affect_another() {
        let saver = RecordingSaver::new(false);
        let running = start(saver.clone()).await;

        let bad = decode_response(&exchange(running.addr, b"garbage\x00").await).unwrap();
        assert!(!bad.success);

        let frame = encode_request(&sample()).unwrap();
        let good = decode_response(&exchange(running.addr, &frame).await).unwrap();
        assert!(good.success);
        assert_eq!(saver.saved().len(), 1);

        running.shutdown.send(true).unwrap();
        let _ = running.task.await;
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_mid_read_connection() {
        let saver = RecordingSaver::new(false);
        let running = start(saver.clone()).await;

        // A connection stuck mid-read: bytes but no terminator.
        let mut stream = TcpStream::connect(running.addr).await.unwrap();
        stream.write_all(b"ipmsg\nfrom:").await.unwrap();

        running.shutdown.send(true).unwrap();

        // The accept loop exits without waiting for the read deadline.
        let served = tokio::time::timeout(Duration::from_secs(2), running.task)
            .await
            .expect("accept loop did not stop")
            .unwrap();
        assert!(matches!(served, Err(ServeError::Cancelled)));

        // The handler dropped the socket instead of waiting out the
        // deadline. EOF and reset both count as closed.
        let mut rest = Vec::new();
        let _ = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut rest))
            .await
            .expect("connection was not closed");
        assert!(saver.saved().is_empty());
    }

    #[tokio::test]
    async fn bind_failure_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let server = MsgServer::new(
            RecordingSaver::new(false),
            PathBuf::from("unused"),
            Notifier::spawn(),
        );
        let (_tx, rx) = watch::channel(false);
        let err = server.run("127.0.0.1", port, rx).await.unwrap_err();
        assert!(matches!(err, ServeError::Bind { .. }));
    }
}
