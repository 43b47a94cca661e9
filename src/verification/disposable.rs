//! Disposable (throwaway) email domain detection.

use std::collections::HashSet;
use std::sync::Arc;

/// Immutable blocklist lookup. Listing a domain also blocks its subdomains.
#[derive(Debug, Clone, Default)]
pub struct DisposableChecker {
    domains: Arc<HashSet<String>>,
}

impl DisposableChecker {
    /// `domains` must already be lower-cased.
    pub fn new(domains: Arc<HashSet<String>>) -> Self {
        Self { domains }
    }

    /// Tests `domain`, then each parent obtained by dropping the leftmost
    /// label, stopping before the bare TLD.
    pub fn is_disposable(&self, domain: &str) -> bool {
        if self.domains.is_empty() {
            return false;
        }
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        let mut candidate = domain.as_str();
        while candidate.contains('.') {
            if self.domains.contains(candidate) {
                tracing::debug!(target: "validation", "{} matched disposable entry {}", domain, candidate);
                return true;
            }
            match candidate.split_once('.') {
                Some((_, parent)) => candidate = parent,
                None => break,
            }
        }
        false
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }
}
