// src/load_balancer/algorithm.rs
use crate::proxy::Upstream;

/// Picks the upstream for a new session.
///
/// Selection carries no health awareness: whatever is returned is dialed,
/// and an unreachable upstream only shows up as a dial failure.
pub trait UpstreamSelector: Send + Sync {
    /// Next upstream in the policy's order, or `None` when nothing is configured.
    fn next(&self) -> Option<Upstream>;

    fn name(&self) -> &'static str;
}
