//! Remembers which domains accept mail for any local part.

use crate::utils::lru::{CacheStats, LruCache};
use parking_lot::Mutex;

#[derive(Debug)]
pub struct CatchAllRegistry {
    domains: Mutex<LruCache<String, bool>>,
}

impl CatchAllRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            domains: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// `Some(true)` for a known catch-all domain, `Some(false)` for a domain
    /// that rejected a random address, `None` when never probed.
    pub fn lookup(&self, domain: &str) -> Option<bool> {
        self.domains.lock().get(&domain.to_lowercase())
    }

    pub fn record(&self, domain: &str, catch_all: bool) {
        self.domains.lock().insert(domain.to_lowercase(), catch_all);
    }

    pub fn stats(&self) -> CacheStats {
        self.domains.lock().stats()
    }
}
