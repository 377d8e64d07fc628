use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    select,
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    mailbox::{DEFAULT_CAPACITY, Mailbox, mailbox},
    message::{FULL_LINE, chat_line, read_line, welcome_line, write_line},
    registry::{ClientId, RegisterError, Registry},
};

/// How long a departed client's write loop may keep flushing queued lines
/// before its connection is torn down anyway.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub mailbox_capacity: usize,
    pub max_clients: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            mailbox_capacity: DEFAULT_CAPACITY,
            max_clients: None,
        }
    }
}

pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

struct ServerState {
    registry: Arc<Registry>,
    mailbox_capacity: usize,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;
        Ok(Self::new(listener, config))
    }

    /// Wraps an already bound listener. `config.listen` is ignored.
    pub fn new(listener: TcpListener, config: ServerConfig) -> Self {
        Self {
            listener,
            state: Arc::new(ServerState {
                registry: Arc::new(Registry::with_limit(config.max_clients)),
                mailbox_capacity: config.mailbox_capacity,
            }),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared view of the connected clients, usable after the server starts.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.state.registry)
    }

    /// Accepts connections until the process is terminated.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves. Sessions already
    /// running are left alone.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, state } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("server no longer accepting connections");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &state);
                }
            }
        }

        Ok(())
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    state: &Arc<ServerState>,
) {
    match result {
        Ok((stream, peer)) => spawn_client_handler(stream, peer, state),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_client_handler(stream: TcpStream, peer: SocketAddr, state: &Arc<ServerState>) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        info!(%peer, "client connected");
        if let Err(err) = handle_connection(stream, peer, state).await {
            warn!(%peer, error = ?err, "client connection closed with error");
        }
    });
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut writer = writer;

    let nickname = read_nickname(&mut reader).await?;
    if state.registry.is_full().await {
        return refuse_client(&mut writer, peer, &nickname).await;
    }
    send_welcome(&mut writer, &nickname).await?;
    info!(%peer, %nickname, "welcome sent");

    let client_id = state.registry.next_id();
    let (outbox, inbox) = mailbox(state.mailbox_capacity);
    match state
        .registry
        .register(client_id, nickname.clone(), outbox)
        .await
    {
        Ok(()) => info!(%peer, %nickname, client_id, "client registered"),
        // Lost a race for the last slot after the welcome went out.
        Err(RegisterError::Full { .. }) => {
            return refuse_client(&mut writer, peer, &nickname).await;
        }
        Err(err) => return Err(err.into()),
    }

    let write_loop = spawn_write_loop(inbox, writer, client_id);
    run_read_loop(&state.registry, &mut reader, client_id, &nickname).await;
    cleanup_client_disconnect(&state.registry, client_id, peer, reader, write_loop).await;

    Ok(())
}

async fn read_nickname<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let nickname = match read_line(reader).await.context("failed to read nickname")? {
        Some(line) => line.trim().to_string(),
        None => anyhow::bail!("connection closed before handshake"),
    };
    debug!(%nickname, "nickname received");
    Ok(nickname)
}

async fn send_welcome<W>(writer: &mut W, nickname: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_line(writer, &welcome_line(nickname))
        .await
        .context("failed to send welcome")
}

async fn refuse_client<W>(writer: &mut W, peer: SocketAddr, nickname: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    info!(%peer, %nickname, "chat full, refusing client");
    write_line(writer, FULL_LINE).await?;
    writer.shutdown().await?;
    Ok(())
}

/// Relays every line the client sends until it disconnects.
async fn run_read_loop<R>(
    registry: &Registry,
    reader: &mut R,
    client_id: ClientId,
    nickname: &str,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_line(reader).await {
            Ok(Some(text)) => {
                let report = registry
                    .broadcast(client_id, &chat_line(nickname, &text))
                    .await;
                debug!(client_id, ?report, "message fanned out");
            }
            Ok(None) => {
                info!(client_id, %nickname, "client disconnected");
                break;
            }
            Err(err) => {
                info!(client_id, %nickname, error = ?err, "client disconnected");
                break;
            }
        }
    }
}

fn spawn_write_loop<W>(mut inbox: Mailbox, mut writer: W, client_id: ClientId) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(line) = inbox.recv().await {
            if let Err(err) = write_line(&mut writer, &line).await {
                debug!(client_id, error = ?err, "failed to deliver message to client");
                break;
            }
        }
        inbox.close();
    })
}

async fn cleanup_client_disconnect<R>(
    registry: &Registry,
    client_id: ClientId,
    peer: SocketAddr,
    reader: R,
    mut write_loop: JoinHandle<()>,
) {
    if let Some(nickname) = registry.remove(client_id).await {
        info!(%peer, %nickname, client_id, "client removed");
    }

    // With the registry entry gone no sender is left, so the write loop
    // flushes what is queued and exits. A peer that stopped reading would
    // park it in `write_all`, hence the bound.
    drop(reader);
    match timeout(DRAIN_TIMEOUT, &mut write_loop).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(client_id, error = ?err, "write loop panicked"),
        Err(_) => {
            debug!(client_id, "write loop stalled, closing connection");
            write_loop.abort();
            let _ = write_loop.await;
        }
    }
}
