//! Bounded per-client outbound queue.
//!
//! Any session may push into any other client's mailbox through a cloned
//! [`MailboxSender`]; only the owning client's write loop drains the
//! [`Mailbox`]. Pushing never waits: a full mailbox rejects the line so a
//! slow reader cannot stall the sender or the rest of the fan-out.

use tokio::sync::mpsc::{self, error::TrySendError};

/// Pending lines a client may have queued before new ones are dropped.
pub const DEFAULT_CAPACITY: usize = 10;

/// Outcome of a single non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The mailbox already holds `capacity` lines; this one was discarded.
    Full,
    /// The owning write loop has exited.
    Closed,
}

/// Creates a mailbox holding at most `capacity` lines (minimum one).
pub fn mailbox(capacity: usize) -> (MailboxSender, Mailbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MailboxSender { tx }, Mailbox { rx })
}

#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<String>,
}

impl MailboxSender {
    pub fn deliver(&self, line: String) -> Delivery {
        match self.tx.try_send(line) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<String>,
}

impl Mailbox {
    /// Waits for the next queued line.
    ///
    /// Returns `None` once the mailbox is closed and drained, or once every
    /// sender has been dropped.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Rejects further pushes. Lines already queued can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
