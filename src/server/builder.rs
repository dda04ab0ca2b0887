// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::proxy::ProxyError;
use crate::server::handler::ConnectionHandler;
use crate::server::listener::bind_tcp;
use crate::server::shutdown::ShutdownCoordinator;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder pattern so `main.rs` can inject its handler and shutdown coordinator.
pub struct ServerBuilder {
    addr: SocketAddr,
    handler: Option<ConnectionHandler>,
    shutdown: Option<Arc<ShutdownCoordinator>>,
}

impl ServerBuilder {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            handler: None,
            shutdown: None,
        }
    }

    /// Inject the connection handler (wraps `proxy::Proxy`).
    pub fn with_handler(mut self, handler: ConnectionHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Share a coordinator whose `trigger()` stops the accept loop.
    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownCoordinator>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Bind the listening socket without starting the accept loop.
    pub async fn bind(self) -> Result<Server> {
        let handler = self
            .handler
            .context("a connection handler must be set via with_handler()")?;
        let shutdown = self.shutdown.unwrap_or_default();
        let listener = bind_tcp(self.addr).await?;

        Ok(Server {
            listener,
            handler,
            shutdown,
        })
    }

    /// Bind and run until drained.
    pub async fn serve(self) -> Result<()> {
        self.bind().await?.run().await
    }
}

pub struct Server {
    listener: TcpListener,
    handler: ConnectionHandler,
    shutdown: Arc<ShutdownCoordinator>,
}

impl Server {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until shutdown is triggered or accepting fails, then close the
    /// listener and wait for in-flight sessions.
    pub async fn run(self) -> Result<()> {
        let Server {
            listener,
            handler,
            shutdown,
        } = self;
        tracing::info!("TCP proxy listening on {}", listener.local_addr()?);

        let accept_result = loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.draining() => break Ok(()),
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    // One task per connection; the loop never waits on a session.
                    shutdown.spawn(handler.clone().handle(stream, peer));
                }
                Err(e) => {
                    let err = ProxyError::Accept(e);
                    tracing::error!(%err, "accept loop stopped");
                    shutdown.trigger();
                    break Err(err);
                }
            }
        };

        drop(listener);
        tracing::info!(
            in_flight = shutdown.active_sessions(),
            "Listener closed, waiting for connections to drain"
        );
        shutdown.wait_drained().await;

        accept_result.map_err(Into::into)
    }
}
