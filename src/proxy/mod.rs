//
// src/proxy/mod.rs
//
mod buffer;
mod copier;
mod pool;
mod proxy;
mod upstream;

pub use buffer::{BufferPool, PooledBuffer};
pub use copier::{copy_with_idle_timeout, CopyEnd, CopyOutcome};
pub use pool::UpstreamPool;
pub use proxy::{Direction, Proxy, ProxyError, SessionOutcome};
pub use upstream::{Upstream, UpstreamError};
