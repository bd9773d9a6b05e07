//! Echo protocol handler for the Tokio runtime.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

use super::parser::{parse, response, Command};
use crate::session::{CloseReason, Session};

/// Initial capacity of the line buffer.
const LINE_CAPACITY: usize = 1024;

/// Longest accepted line, excluding its terminator. A longer line closes
/// the session.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Handle an echo protocol connection.
///
/// Reads newline-terminated lines and answers each with one line until the
/// client quits, closes the connection, goes idle for longer than
/// `idle_timeout`, sends a line over [`MAX_LINE_LENGTH`] bytes, or the
/// owning server stops. Invalid UTF-8 is replaced rather than rejected.
pub async fn handle_connection<S>(
    stream: S,
    mut session: Session,
    idle_timeout: Option<Duration>,
) -> io::Result<CloseReason>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut line = Vec::with_capacity(LINE_CAPACITY);

    while session.is_active() {
        line.clear();

        // One extra byte leaves room for the terminator
        let mut limited = (&mut reader).take(MAX_LINE_LENGTH as u64 + 1);
        let read = limited.read_until(b'\n', &mut line);
        let n = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result?,
                Err(_) => {
                    session.close(CloseReason::IdleTimeout);
                    break;
                }
            },
            None => read.await?,
        };

        if n == 0 {
            session.close(CloseReason::PeerClosed);
            break;
        }

        if line.len() > MAX_LINE_LENGTH && line.last() != Some(&b'\n') {
            session.close(CloseReason::LineTooLong);
            break;
        }

        let text = String::from_utf8_lossy(&line);
        let command = parse(&text);
        trace!(peer = %session.peer(), ?command, "Processing line");

        writer.write_all(response(&command).as_bytes()).await?;

        if command == Command::Quit {
            session.close(CloseReason::Quit);
        }
    }

    writer.flush().await?;

    let reason = session.close_reason().unwrap_or(CloseReason::ServerStopped);
    debug!(peer = %session.peer(), %reason, "Session closed");
    Ok(reason)
}
