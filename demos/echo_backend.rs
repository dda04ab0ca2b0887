//! demos/echo_backend.rs
//! Run: cargo run --example echo_backend -- [port]

use anyhow::Result;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("echo_backend=info".parse()?),
        )
        .init();

    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(7777);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let listener = TcpListener::bind(addr).await?;
    info!("Echo backend listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!(%peer, "Accepted connection");
                tokio::spawn(echo(stream, peer));
            }
            Err(e) => warn!("Error accepting client connection: {}", e),
        }
    }
}

async fn echo(mut stream: TcpStream, peer: SocketAddr) {
    let (mut reader, mut writer) = stream.split();
    match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(bytes) => info!(%peer, bytes, "Connection closed cleanly"),
        Err(e) => warn!(%peer, "Connection closed or error: {}", e),
    }
}
