// ────────────────────────────────
// src/proxy/proxy.rs
// Per-connection session: select, dial, relay both directions, tear down.
// ────────────────────────────────

use super::buffer::BufferPool;
use super::copier::{copy_with_idle_timeout, CopyOutcome};
use super::upstream::Upstream;
use crate::config::TimeoutConfig;
use crate::load_balancer::UpstreamSelector;
use crate::metrics::{FailureReason, MetricsRecorder, Timer};
use chrono::Utc;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No upstream servers available")]
    NoUpstream,

    #[error("Failed to dial upstream '{upstream}': {source}")]
    Dial {
        upstream: Upstream,
        #[source]
        source: io::Error,
    },

    #[error("Dialing upstream '{upstream}' timed out after {timeout:?}")]
    DialTimeout { upstream: Upstream, timeout: Duration },

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// Relay direction of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to upstream.
    Upstream,
    /// Upstream to client.
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("client->upstream"),
            Direction::Downstream => f.write_str("upstream->client"),
        }
    }
}

/// How a session ended. Returned for logging and tests; callers dispatching
/// connections are free to ignore it.
#[derive(Debug)]
pub enum SessionOutcome {
    NoUpstream,
    DialFailed {
        upstream: Upstream,
    },
    Relayed {
        upstream: Upstream,
        closed_by: Direction,
        duration: Duration,
    },
}

/// Decrements the active gauge however the session exits.
struct ActiveConnection<'a> {
    metrics: &'a dyn MetricsRecorder,
}

impl<'a> ActiveConnection<'a> {
    fn open(metrics: &'a dyn MetricsRecorder) -> Self {
        metrics.active_connections_inc();
        metrics.connection_handled();
        Self { metrics }
    }
}

impl Drop for ActiveConnection<'_> {
    fn drop(&mut self) {
        self.metrics.active_connections_dec();
    }
}

pub struct Proxy {
    selector: Arc<dyn UpstreamSelector>,
    buffers: BufferPool,
    metrics: Arc<dyn MetricsRecorder>,
    timeouts: TimeoutConfig,
}

impl Proxy {
    pub fn new(
        selector: Arc<dyn UpstreamSelector>,
        buffers: BufferPool,
        metrics: Arc<dyn MetricsRecorder>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            selector,
            buffers,
            metrics,
            timeouts,
        }
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Run one client connection to completion.
    ///
    /// The client socket is closed on every path: immediately when no
    /// upstream is available or the dial fails, otherwise once the relay ends.
    pub async fn handle(&self, client: TcpStream, peer: SocketAddr) -> SessionOutcome {
        let upstream = match self.select_upstream() {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(%peer, error = %e, "Closing connection");
                return SessionOutcome::NoUpstream;
            }
        };

        let server = match self.dial(&upstream).await {
            Ok(server) => server,
            Err(e) => {
                self.metrics.connection_failed(FailureReason::DialError);
                warn!(%peer, error = %e, "Closing connection");
                return SessionOutcome::DialFailed { upstream };
            }
        };

        let _active = ActiveConnection::open(self.metrics.as_ref());
        let session = Timer::new();
        info!(
            %peer,
            %upstream,
            started_at = %Utc::now().to_rfc3339(),
            "Proxying connection"
        );

        let closed_by = self.relay(client, server).await;

        let duration = session.elapsed();
        self.metrics.observe_connection_duration(duration);
        info!(%peer, %upstream, ?duration, %closed_by, "Closing connection");

        SessionOutcome::Relayed {
            upstream,
            closed_by,
            duration,
        }
    }

    fn select_upstream(&self) -> Result<Upstream, ProxyError> {
        self.selector.next().ok_or(ProxyError::NoUpstream)
    }

    /// Single dial attempt bounded by the dial timeout; no failover.
    async fn dial(&self, upstream: &Upstream) -> Result<TcpStream, ProxyError> {
        let dial_timeout = self.timeouts.dial_timeout();

        let timer = Timer::new();
        let result = timeout(dial_timeout, TcpStream::connect(upstream.address())).await;
        self.metrics.observe_dial_duration(timer.elapsed());

        match result {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(ProxyError::Dial {
                upstream: upstream.clone(),
                source,
            }),
            Err(_) => Err(ProxyError::DialTimeout {
                upstream: upstream.clone(),
                timeout: dial_timeout,
            }),
        }
    }

    /// Copy both directions until one ends, then stop the other.
    ///
    /// Upstream-to-client runs on its own task; client-to-upstream runs on
    /// the session task. When either finishes the partner is aborted and
    /// joined, and all four halves are dropped before this returns, closing
    /// both sockets.
    async fn relay(&self, client: TcpStream, server: TcpStream) -> Direction {
        let idle_timeout = self.timeouts.idle_timeout();
        let (mut client_read, client_write) = client.into_split();
        let (server_read, mut server_write) = server.into_split();

        let buffers = self.buffers.clone();
        let metrics = Arc::clone(&self.metrics);
        let mut downstream = tokio::spawn(async move {
            let (mut server_read, mut client_write) = (server_read, client_write);
            copy_with_idle_timeout(
                &mut server_read,
                &mut client_write,
                &buffers,
                idle_timeout,
                metrics.as_ref(),
            )
            .await
        });

        let upstream = copy_with_idle_timeout(
            &mut client_read,
            &mut server_write,
            &self.buffers,
            idle_timeout,
            self.metrics.as_ref(),
        );

        let (closed_by, first) = tokio::select! {
            outcome = upstream => {
                downstream.abort();
                let _ = (&mut downstream).await;
                (Direction::Upstream, Some(outcome))
            }
            joined = &mut downstream => (Direction::Downstream, joined.ok()),
        };

        if let Some(CopyOutcome { bytes, end }) = first {
            debug!(direction = %closed_by, bytes, %end, "Relay direction finished first");
        }

        drop(client_read);
        drop(server_write);
        closed_by
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::RoundRobinSelector;
    use crate::metrics::{MetricsCollector, MetricsRegistry};
    use crate::proxy::UpstreamPool;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpSocket};

    fn proxy_for(upstreams: &[String]) -> (Proxy, Arc<MetricsCollector>) {
        proxy_with_dial_timeout(upstreams, 500)
    }

    fn proxy_with_dial_timeout(
        upstreams: &[String],
        dial_timeout_ms: u64,
    ) -> (Proxy, Arc<MetricsCollector>) {
        let pool: UpstreamPool = upstreams
            .iter()
            .map(|a| Upstream::parse(a).unwrap())
            .collect();
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();
        let proxy = Proxy::new(
            Arc::new(RoundRobinSelector::new(pool)),
            BufferPool::new(1024, 8),
            metrics.clone(),
            TimeoutConfig {
                dial_timeout_ms,
                idle_timeout_secs: 5,
            },
        );
        (proxy, metrics)
    }

    async fn client_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (accepted, peer) = listener.accept().await.unwrap();
        (client, accepted, peer)
    }

    async fn unreachable_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[tokio::test]
    async fn empty_pool_closes_client_without_metrics() {
        let (proxy, metrics) = proxy_for(&[]);
        let (mut client, accepted, peer) = client_pair().await;

        let outcome = proxy.handle(accepted, peer).await;
        assert!(matches!(outcome, SessionOutcome::NoUpstream));

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap_or(0), 0);
        assert_eq!(metrics.total_connections_handled.get(), 0);
        assert_eq!(metrics.upstream_dial_duration_seconds.get_sample_count(), 0);
        assert_eq!(metrics.connection_duration_seconds.get_sample_count(), 0);
    }

    #[tokio::test]
    async fn dial_failure_is_counted_once() {
        let (proxy, metrics) = proxy_for(&[unreachable_address().await]);
        let (mut client, accepted, peer) = client_pair().await;

        let outcome = proxy.handle(accepted, peer).await;
        assert!(matches!(outcome, SessionOutcome::DialFailed { .. }));

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap_or(0), 0);
        assert_eq!(metrics.failures(FailureReason::DialError), 1);
        assert_eq!(metrics.total_connections_handled.get(), 0);
        assert_eq!(metrics.current_active_connections.get(), 0);
        assert_eq!(metrics.bytes_transferred.get(), 0);
        assert_eq!(metrics.upstream_dial_duration_seconds.get_sample_count(), 1);
    }

    /// Listener with a zero backlog whose single queue slot is taken by a
    /// connection that is never accepted, so further handshakes stall.
    async fn saturated_listener() -> (TcpListener, TcpStream, SocketAddr) {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(0).unwrap();
        let addr = listener.local_addr().unwrap();
        let held = TcpStream::connect(addr).await.unwrap();
        (listener, held, addr)
    }

    #[tokio::test]
    async fn stalled_dial_times_out() {
        let (_listener, _held, addr) = saturated_listener().await;
        let (proxy, metrics) = proxy_with_dial_timeout(&[addr.to_string()], 200);
        let upstream = Upstream::parse(&addr.to_string()).unwrap();

        let err = proxy.dial(&upstream).await.unwrap_err();
        match err {
            ProxyError::DialTimeout { timeout, .. } => {
                assert_eq!(timeout, Duration::from_millis(200))
            }
            other => panic!("expected dial timeout, got {other:?}"),
        }
        assert_eq!(metrics.upstream_dial_duration_seconds.get_sample_count(), 1);
    }

    #[tokio::test]
    async fn dial_timeout_closes_client_as_dial_error() {
        let (_listener, _held, addr) = saturated_listener().await;
        let (proxy, metrics) = proxy_with_dial_timeout(&[addr.to_string()], 200);
        let (mut client, accepted, peer) = client_pair().await;

        let started = std::time::Instant::now();
        let outcome = proxy.handle(accepted, peer).await;
        let elapsed = started.elapsed();

        assert!(matches!(outcome, SessionOutcome::DialFailed { .. }));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(200) + Duration::from_secs(2));

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap_or(0), 0);
        assert_eq!(metrics.failures(FailureReason::DialError), 1);
        assert_eq!(metrics.upstream_dial_duration_seconds.get_sample_count(), 1);
        assert_eq!(metrics.total_connections_handled.get(), 0);
        assert_eq!(metrics.current_active_connections.get(), 0);
    }

    #[tokio::test]
    async fn relays_and_closes_when_client_leaves() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (proxy, metrics) = proxy_for(&[upstream.local_addr().unwrap().to_string()]);
        let (mut client, accepted, peer) = client_pair().await;

        let echo = tokio::spawn(async move {
            let (mut conn, _) = upstream.accept().await.unwrap();
            let (mut reader, mut writer) = conn.split();
            tokio::io::copy(&mut reader, &mut writer).await.ok();
        });

        let proxy = Arc::new(proxy);
        let session = {
            let proxy = Arc::clone(&proxy);
            tokio::spawn(async move { proxy.handle(accepted, peer).await })
        };

        client.write_all(b"ping").await.unwrap();
        let mut echoed = [0u8; 4];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"ping");
        assert_eq!(metrics.current_active_connections.get(), 1);

        drop(client);
        let outcome = session.await.unwrap();
        echo.await.unwrap();

        match outcome {
            SessionOutcome::Relayed { closed_by, .. } => assert_eq!(closed_by, Direction::Upstream),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(metrics.bytes_transferred.get(), 8);
        assert_eq!(metrics.total_connections_handled.get(), 1);
        assert_eq!(metrics.current_active_connections.get(), 0);
        assert_eq!(metrics.connection_duration_seconds.get_sample_count(), 1);
        assert_eq!(proxy.buffers().available(), 2);
    }

    #[tokio::test]
    async fn upstream_close_tears_down_client() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (proxy, metrics) = proxy_for(&[upstream.local_addr().unwrap().to_string()]);
        let (mut client, accepted, peer) = client_pair().await;

        tokio::spawn(async move {
            let (mut conn, _) = upstream.accept().await.unwrap();
            conn.write_all(b"bye").await.unwrap();
        });

        let outcome = proxy.handle(accepted, peer).await;
        assert!(matches!(
            outcome,
            SessionOutcome::Relayed {
                closed_by: Direction::Downstream,
                ..
            }
        ));

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");
        assert_eq!(metrics.current_active_connections.get(), 0);
    }
}
