// src/load_balancer/round_robin.rs
use crate::load_balancer::UpstreamSelector;
use crate::proxy::{Upstream, UpstreamPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// Cycles through the pool in configured order, one step per call.
///
/// The cursor is a single atomic word, so concurrent callers each claim a
/// distinct rotation slot.
pub struct RoundRobinSelector {
    pool: UpstreamPool,
    counter: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new(pool: UpstreamPool) -> Self {
        Self {
            pool,
            counter: AtomicUsize::new(0),
        }
    }
}

impl UpstreamSelector for RoundRobinSelector {
    fn next(&self) -> Option<Upstream> {
        if self.pool.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        let upstream = self.pool[index].clone();
        trace!(%upstream, index, "round-robin selected upstream");
        Some(upstream)
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
