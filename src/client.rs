//! Demonstration client for the echo protocol.
//!
//! Relays operator lines to the echo server and prints every response
//! line as it arrives. Input and output are generic so the relay can be
//! driven by in-memory streams.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Prefix printed before each server response
const RESPONSE_PREFIX: &str = "Сервер: ";

/// Printed when the server closes the connection
const DISCONNECTED: &str = "Сервер отключился";

/// Connected demonstration client
pub struct DemoClient<S> {
    stream: S,
}

impl DemoClient<TcpStream> {
    /// Connect to the echo server at `addr`
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!(server = %addr, "Demo client connected");
        Ok(Self::new(stream))
    }
}

impl<S> DemoClient<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Send every non-empty input line and print responses to `output`
    /// until `quit` is sent (or input ends, which sends `quit`) and the
    /// server closes the connection.
    pub async fn run<I, O>(self, mut input: I, output: O) -> io::Result<()>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, mut writer) = tokio::io::split(self.stream);
        let receiver = tokio::spawn(print_responses(BufReader::new(reader), output));

        let mut line = String::new();
        loop {
            line.clear();
            let message = if input.read_line(&mut line).await? == 0 {
                "quit"
            } else {
                line.trim()
            };

            if message.is_empty() {
                continue;
            }

            writer.write_all(format!("{message}\n").as_bytes()).await?;

            if message.eq_ignore_ascii_case("quit") {
                break;
            }
        }

        // The server closes the connection after answering `quit`
        receiver
            .await
            .map_err(io::Error::other)?
    }
}

async fn print_responses<R, O>(mut reader: R, mut output: O) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            output.write_all(format!("{DISCONNECTED}\n").as_bytes()).await?;
            break;
        }
        output
            .write_all(format!("{RESPONSE_PREFIX}{}\n", line.trim()).as_bytes())
            .await?;
        output.flush().await?;
    }
    output.flush().await
}

/// Wait `delay`, then relay standard input to the echo server at `addr`.
pub async fn run_demo(addr: SocketAddr, delay: Duration) {
    tokio::time::sleep(delay).await;
    info!("Starting demonstration client; type lines to echo, 'quit' to finish");

    let client = match DemoClient::connect(addr).await {
        Ok(client) => client,
        Err(e) => {
            warn!(server = %addr, error = %e, "Demo client failed to connect");
            return;
        }
    };

    let stdin = BufReader::new(tokio::io::stdin());
    match client.run(stdin, tokio::io::stdout()).await {
        Ok(()) => info!("Demonstration client finished"),
        Err(e) => warn!(error = %e, "Demonstration client failed"),
    }
}
