//! Audible new-message cue: a bounded queue drained by one worker task.
//! Enqueueing never blocks; a full queue drops the request.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

const QUEUE_DEPTH: usize = 10;

/// Gap between cues so back-to-back messages stay audible as separate
/// beeps.
const CUE_GAP: Duration = Duration::from_millis(350);

/// Handle for requesting a notification cue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<()>,
}

impl Notifier {
    /// Spawn the worker task and return its handle. The worker lives as
    /// long as the runtime or until every handle is dropped.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(worker(rx));
        Self { tx }
    }

    /// Queue one cue. Never blocks; silently drops when the queue is full.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

async fn worker(mut rx: mpsc::Receiver<()>) {
    use std::io::Write;
    while rx.recv().await.is_some() {
        // ASCII BEL; the hosting terminal renders the cue.
        let mut out = std::io::stdout();
        if out.write_all(b"\x07").and_then(|_| out.flush()).is_err() {
            debug!("notification cue failed");
        }
        tokio::time::sleep(CUE_GAP).await;
    }
}
