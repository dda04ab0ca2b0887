// src/server/handler.rs
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::Instrument;
use uuid::Uuid;

use crate::proxy::Proxy;

/// Cloneable entry point the accept loop hands each connection to.
#[derive(Clone)]
pub struct ConnectionHandler {
    proxy: Arc<Proxy>,
}

impl ConnectionHandler {
    pub fn new(proxy: Arc<Proxy>) -> Self {
        Self { proxy }
    }

    /// Serve one connection inside its own `session` span. The outcome has
    /// already been logged by the proxy and is dropped here.
    pub async fn handle(self, stream: TcpStream, peer: SocketAddr) {
        let span = tracing::info_span!("session", id = %Uuid::new_v4(), %peer);
        let _ = self.proxy.handle(stream, peer).instrument(span).await;
    }
}
