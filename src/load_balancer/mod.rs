// src/load_balancer/mod.rs
mod algorithm;
mod round_robin;

pub use algorithm::UpstreamSelector; // trait
pub use round_robin::RoundRobinSelector;
pub use crate::config::LoadBalancerAlgorithm;

use crate::proxy::UpstreamPool;
use std::sync::Arc;

pub fn create_selector(
    algorithm: LoadBalancerAlgorithm,
    pool: UpstreamPool,
) -> Arc<dyn UpstreamSelector> {
    if pool.is_empty() {
        tracing::warn!("No upstreams configured; every connection will be closed immediately");
    }

    match algorithm {
        LoadBalancerAlgorithm::RoundRobin => Arc::new(RoundRobinSelector::new(pool)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Upstream;

    #[test]
    fn creates_round_robin() {
        let pool = UpstreamPool::new(vec![Upstream::parse("a:1").unwrap()]);
        let selector = create_selector(LoadBalancerAlgorithm::RoundRobin, pool);
        assert_eq!(selector.name(), "round_robin");
        assert_eq!(selector.next().unwrap().address(), "a:1");
    }
}
