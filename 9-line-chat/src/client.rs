use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    message::{read_line, write_line},
};

pub async fn run(args: ClientArgs) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let nickname = match args.nickname.clone() {
        Some(nickname) => nickname,
        None => prompt_nickname(&mut stdin).await?,
    };

    let (reader, mut writer) = establish_connection(&args).await?;
    write_line(&mut writer, nickname.trim())
        .await
        .context("failed to send nickname")?;

    let mut server_lines = reader.lines();
    let mut input_lines = stdin.lines();
    run_client_loop(&mut server_lines, &mut writer, &mut input_lines).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn prompt_nickname<R>(stdin: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Enter your nickname: ").await?;
    stdout.flush().await?;

    let line = read_line(stdin)
        .await?
        .context("stdin closed before a nickname was entered")?;
    Ok(line.trim().to_string())
}

async fn establish_connection(
    args: &ClientArgs,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

async fn run_client_loop<R>(
    server_lines: &mut Lines<BufReader<OwnedReadHalf>>,
    writer: &mut OwnedWriteHalf,
    input_lines: &mut Lines<R>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    // `next_line` is cancel safe, so a line is never lost when the other branch wins.
    loop {
        select! {
            server_line = server_lines.next_line() => {
                if !handle_server_line(server_line).await? {
                    break;
                }
            }
            input = input_lines.next_line() => {
                if !handle_stdin_input(input, writer).await? {
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn handle_server_line(line: io::Result<Option<String>>) -> Result<bool> {
    match line {
        Ok(Some(line)) => {
            write_stdout(&line).await?;
            Ok(true)
        }
        Ok(None) => {
            write_stdout("Server disconnected").await?;
            Ok(false)
        }
        Err(err) => {
            write_stdout(&format!("Server disconnected: {err}")).await?;
            Ok(false)
        }
    }
}

async fn handle_stdin_input(
    input: io::Result<Option<String>>,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    let Some(input) = input? else {
        return Ok(false);
    };

    write_line(writer, input.trim())
        .await
        .context("failed to send message")?;
    Ok(true)
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
