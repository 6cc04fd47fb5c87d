//! Demo backend
//!
//! A throwaway upstream for trying the balancer locally: every connection gets
//! a small HTTP/1.1 response naming the port that served it.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Request heads larger than this are not read further.
const MAX_HEAD: usize = 8 * 1024;

#[derive(Debug, Parser)]
#[command(name = "demo-backend", about = "Answers every connection with its own port")]
struct Args {
    /// Port to listen on.
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let listener = TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("failed to bind port {}", args.port))?;
    info!(port = args.port, "Demo backend listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Accept error");
                continue;
            }
        };
        let port = args.port;
        tokio::spawn(async move {
            if let Err(e) = respond(stream, port).await {
                debug!(%peer, error = %e, "Response failed");
            }
        });
    }
}

async fn respond(mut stream: TcpStream, port: u16) -> std::io::Result<()> {
    let mut head = Vec::with_capacity(1024);
    let mut buf = [0u8; 1024];
    while head.len() < MAX_HEAD && !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }

    let body = format!("Hello from port: {port}\n");
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
