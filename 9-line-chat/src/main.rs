use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use line_chat::{
    cli::{Cli, Command, ServerArgs},
    client,
    server::Server,
};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();

    match Cli::parse().command {
        Command::Server(args) => run_server(args).await,
        Command::Client(args) => client::run(args).await,
    }
}

async fn run_server(args: ServerArgs) -> Result<()> {
    let config = args.into();
    let server = Server::bind(config).await?;

    // Tests scrape the address from the end of this line.
    info!("server listening on {}", server.local_addr()?);
    server.run().await
}
