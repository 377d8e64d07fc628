//! Line-oriented TCP chat server with a matching terminal client.
//!
//! A client sends its nickname as the first line, receives
//! `Welcome to the chat, <nickname>!`, and from then on every line it sends
//! is relayed to all other connected clients as `<nickname>: <line>`.
//!
//! - [`cli`] parses the command line for server and client modes.
//! - [`server`] accepts TCP connections and runs one session per client:
//!   handshake, registration, a read loop that fans messages out, and a
//!   write loop that drains the client's mailbox.
//! - [`registry`] holds the connected clients behind a single lock and
//!   performs the fan-out.
//! - [`mailbox`] is the bounded outbound queue each client owns. A full
//!   mailbox drops new messages instead of slowing anyone down.
//! - [`message`] provides line framing and the protocol's fixed lines.
//! - [`client`] connects to a server, multiplexing stdin and server lines.

pub mod cli;
pub mod client;
pub mod mailbox;
pub mod message;
pub mod registry;
pub mod server;
