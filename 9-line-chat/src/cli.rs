use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand, builder::TypedValueParser};

use crate::{mailbox::DEFAULT_CAPACITY, server::ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server, accepting TCP connections.
    Server(ServerArgs),
    /// Connect to a server and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address the server should bind to. Use port 0 for an ephemeral port.
    #[arg(long, env = "LINE_CHAT_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Lines queued per client before further messages to it are dropped.
    #[arg(
        long,
        default_value_t = DEFAULT_CAPACITY,
        value_parser = clap::value_parser!(u16).range(1..).map(usize::from)
    )]
    pub mailbox_capacity: usize,

    /// Refuse new clients once this many are connected. Unlimited by default.
    #[arg(long)]
    pub max_clients: Option<usize>,
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        Self {
            listen: args.listen,
            mailbox_capacity: args.mailbox_capacity,
            max_clients: args.max_clients,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Nickname to join with. Prompted for on stdin when omitted.
    #[arg(long)]
    pub nickname: Option<String>,

    /// Address of the server to connect to.
    #[arg(long, env = "LINE_CHAT_SERVER", default_value = "127.0.0.1:8000")]
    pub server: SocketAddr,
}
