use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Line greeting a freshly registered client.
pub fn welcome_line(nickname: &str) -> String {
    format!("Welcome to the chat, {nickname}!")
}

/// Line relayed to every other client when `nickname` says `text`.
pub fn chat_line(nickname: &str, text: &str) -> String {
    format!("{nickname}: {text}")
}

/// Sent instead of registering when the server is at its client limit.
pub const FULL_LINE: &str = "Chat is full, try again later";

/// Reads one `\n`-terminated line with its terminator stripped.
///
/// Returns `Ok(None)` once the peer has closed its side. A fragment cut off by
/// EOF before its `\n` is not a line and is discarded.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if !line.ends_with('\n') {
        return Ok(None);
    }

    let len = line.trim_end_matches(LINE_ENDINGS).len();
    line.truncate(len);
    Ok(Some(line))
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // One buffer per line so a single write_all never splits the terminator off.
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}
