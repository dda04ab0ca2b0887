//
// src/proxy/pool.rs
//

use super::upstream::Upstream;
use std::ops::Deref;
use std::sync::Arc;

/// Ordered, immutable set of upstreams shared by every selector clone.
#[derive(Debug, Clone, Default)]
pub struct UpstreamPool {
    upstreams: Arc<[Upstream]>,
}

impl UpstreamPool {
    pub fn new(upstreams: Vec<Upstream>) -> Self {
        Self {
            upstreams: upstreams.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }
}

impl Deref for UpstreamPool {
    type Target = [Upstream];

    fn deref(&self) -> &Self::Target {
        &self.upstreams
    }
}

impl FromIterator<Upstream> for UpstreamPool {
    fn from_iter<I: IntoIterator<Item = Upstream>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_configured_order() {
        let pool: UpstreamPool = ["a:1", "b:2", "c:3"]
            .into_iter()
            .map(|a| Upstream::parse(a).unwrap())
            .collect();

        assert_eq!(pool.len(), 3);
        assert_eq!(pool[0].address(), "a:1");
        assert_eq!(pool[2].address(), "c:3");
    }

    #[test]
    fn clones_share_storage() {
        let pool = UpstreamPool::new(vec![Upstream::parse("a:1").unwrap()]);
        let clone = pool.clone();
        assert!(std::ptr::eq(pool.as_ptr(), clone.as_ptr()));
    }
}
