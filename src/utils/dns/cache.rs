//! Shared cache of definitive per-domain DNS verdicts.

use crate::utils::lru::{CacheStats, LruCache};
use parking_lot::Mutex;

/// Outcome of resolving one domain's mail routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainCacheEntry {
    pub domain: String,
    pub has_mx: bool,
    /// Why the domain cannot receive mail, or why the answer is unknown.
    pub error_text: Option<String>,
    /// MX exchanges in preference order, or the domain itself on A/AAAA fallback.
    pub mail_hosts: Vec<String>,
    /// False for transient failures; such entries never reach the cache.
    pub cacheable: bool,
}

impl DomainCacheEntry {
    pub fn deliverable(domain: &str, mail_hosts: Vec<String>) -> Self {
        Self {
            domain: domain.to_string(),
            has_mx: true,
            error_text: None,
            mail_hosts,
            cacheable: true,
        }
    }

    pub fn undeliverable(domain: &str, reason: impl Into<String>) -> Self {
        Self {
            domain: domain.to_string(),
            has_mx: false,
            error_text: Some(reason.into()),
            mail_hosts: Vec::new(),
            cacheable: true,
        }
    }

    pub fn transient(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            has_mx: false,
            error_text: Some("temporary DNS failure".to_string()),
            mail_hosts: Vec::new(),
            cacheable: false,
        }
    }

    pub fn is_transient(&self) -> bool {
        !self.cacheable
    }

    pub fn reason(&self) -> &str {
        self.error_text.as_deref().unwrap_or("")
    }
}

/// Every read updates recency, so a plain mutex rather than a read/write lock.
/// The lock is only ever held for in-memory work.
#[derive(Debug)]
pub struct DnsCache {
    inner: Mutex<LruCache<String, DomainCacheEntry>>,
}

impl DnsCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, domain: &str) -> Option<DomainCacheEntry> {
        self.inner.lock().get(&domain.to_string())
    }

    /// Stores `entry` if it is definitive. Returns whether it was stored.
    pub fn insert(&self, entry: DomainCacheEntry) -> bool {
        if !entry.cacheable {
            return false;
        }
        self.inner.lock().insert(entry.domain.clone(), entry);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }
}
