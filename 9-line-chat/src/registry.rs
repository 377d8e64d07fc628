use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::mailbox::{Delivery, MailboxSender};

pub type ClientId = u64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("client {0} is already registered")]
    AlreadyRegistered(ClientId),
    #[error("chat is full ({limit} clients)")]
    Full { limit: usize },
}

/// Per-recipient outcome of one fan-out pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

struct RegisteredClient {
    id: ClientId,
    nickname: String,
    mailbox: MailboxSender,
}

/// Set of clients that finished the handshake and are still connected.
///
/// Every operation takes the one lock over the whole collection, including
/// the full fan-out in [`Registry::broadcast`], so a client is never
/// delivered to halfway through its registration or removal.
pub struct Registry {
    clients: Mutex<Vec<RegisteredClient>>,
    next_id: AtomicU64,
    max_clients: Option<usize>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// A registry that refuses registrations once `max_clients` are present.
    pub fn with_limit(max_clients: Option<usize>) -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            max_clients,
        }
    }

    pub fn next_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn register(
        &self,
        id: ClientId,
        nickname: String,
        mailbox: MailboxSender,
    ) -> Result<(), RegisterError> {
        let mut clients = self.clients.lock().await;

        if clients.iter().any(|client| client.id == id) {
            return Err(RegisterError::AlreadyRegistered(id));
        }
        if let Some(limit) = self.max_clients.filter(|limit| clients.len() >= *limit) {
            return Err(RegisterError::Full { limit });
        }

        clients.push(RegisteredClient {
            id,
            nickname,
            mailbox,
        });
        Ok(())
    }

    /// Removes the client and returns its nickname, or `None` if it was
    /// never registered or is already gone.
    pub async fn remove(&self, id: ClientId) -> Option<String> {
        let mut clients = self.clients.lock().await;
        let index = clients.iter().position(|client| client.id == id)?;
        Some(clients.remove(index).nickname)
    }

    /// Pushes `line` into the mailbox of every registered client except
    /// `sender`. Full mailboxes lose the line; nothing here ever waits on a
    /// recipient.
    pub async fn broadcast(&self, sender: ClientId, line: &str) -> BroadcastReport {
        let clients = self.clients.lock().await;
        let mut report = BroadcastReport::default();

        for client in clients.iter().filter(|client| client.id != sender) {
            match client.mailbox.deliver(line.to_string()) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Full => {
                    warn!(
                        client_id = client.id,
                        nickname = %client.nickname,
                        "mailbox full, dropping message"
                    );
                    report.dropped += 1;
                }
                Delivery::Closed => {
                    debug!(client_id = client.id, "mailbox closed, skipping recipient");
                    report.closed += 1;
                }
            }
        }

        report
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    /// Whether a registration attempted now would be refused for lack of room.
    pub async fn is_full(&self) -> bool {
        let clients = self.clients.lock().await;
        self.max_clients.is_some_and(|limit| clients.len() >= limit)
    }

    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.lock().await.iter().any(|client| client.id == id)
    }
}
