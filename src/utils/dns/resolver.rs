//! Mail-routing lookups with retry, server failover and a selective cache.

use super::cache::{DnsCache, DomainCacheEntry};
use super::transport::{DnsError, DnsTransport, LookupAnswer, RecordKind};
use crate::core::config::{retry_delay, Config};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub struct DomainResolver {
    transport: Arc<dyn DnsTransport>,
    servers: Vec<SocketAddr>,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    cache: Arc<DnsCache>,
}

impl DomainResolver {
    pub fn new(
        transport: Arc<dyn DnsTransport>,
        servers: Vec<SocketAddr>,
        config: &Config,
        cache: Arc<DnsCache>,
    ) -> Self {
        Self {
            transport,
            servers,
            timeout: config.dns_timeout,
            max_retries: config.dns_max_retries,
            retry_delay: config.dns_retry_delay,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<DnsCache> {
        &self.cache
    }

    /// Resolves where mail for `domain` would be delivered.
    ///
    /// Cached verdicts are returned without network I/O. Definitive answers
    /// are written through to the cache; transient failures are not.
    pub async fn check_domain(&self, domain: &str) -> DomainCacheEntry {
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        if let Some(hit) = self.cache.get(&domain) {
            tracing::debug!(target: "dns_task", "Cache hit for {}", domain);
            return hit;
        }

        let entry = self.resolve(&domain).await;
        if self.cache.insert(entry.clone()) {
            tracing::debug!(target: "dns_task", "Cached DNS verdict for {}: has_mx={}", domain, entry.has_mx);
        } else {
            tracing::warn!(target: "dns_task", "Transient DNS failure for {}; not cached", domain);
        }
        entry
    }

    async fn resolve(&self, domain: &str) -> DomainCacheEntry {
        match self.query(domain, RecordKind::Mx).await {
            Ok(LookupAnswer::Mx(mut records)) => {
                records.sort_by_key(|r| r.preference);
                let hosts: Vec<String> = records
                    .into_iter()
                    .map(|r| r.exchange)
                    .filter(|h| !h.is_empty())
                    .collect();
                if !hosts.is_empty() {
                    tracing::debug!(target: "dns_task", "MX for {}: {:?}", domain, hosts);
                    return DomainCacheEntry::deliverable(domain, hosts);
                }
                tracing::debug!(target: "dns_task", "Null MX for {}, trying address records", domain);
            }
            Ok(LookupAnswer::NxDomain) => {
                return DomainCacheEntry::undeliverable(domain, "Domain does not exist (NXDOMAIN)");
            }
            Ok(LookupAnswer::Empty) | Ok(LookupAnswer::Addresses(_)) => {
                tracing::debug!(target: "dns_task", "No MX for {}, trying address records", domain);
            }
            Err(e) => {
                tracing::debug!(target: "dns_task", "MX lookup for {} failed: {}", domain, e);
                return DomainCacheEntry::transient(domain);
            }
        }

        for kind in [RecordKind::A, RecordKind::Aaaa] {
            match self.query(domain, kind).await {
                Ok(LookupAnswer::Addresses(ips)) if !ips.is_empty() => {
                    tracing::debug!(target: "dns_task", "{} fallback for {}: {:?}", kind, domain, ips);
                    return DomainCacheEntry::deliverable(domain, vec![domain.to_string()]);
                }
                Ok(LookupAnswer::NxDomain) => {
                    return DomainCacheEntry::undeliverable(domain, "Domain does not exist (NXDOMAIN)");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(target: "dns_task", "{} lookup for {} failed: {}", kind, domain, e);
                    return DomainCacheEntry::transient(domain);
                }
            }
        }

        DomainCacheEntry::undeliverable(domain, "No MX, A or AAAA records found")
    }

    /// Tries each server in order, retrying transient failures on each
    /// before moving on. The first definitive answer wins.
    async fn query(&self, name: &str, kind: RecordKind) -> Result<LookupAnswer, DnsError> {
        let attempts = self.max_retries.max(1);
        let mut last_error = DnsError::Transient("no DNS servers configured".to_string());

        for server in &self.servers {
            for attempt in 0..attempts {
                let result =
                    tokio::time::timeout(self.timeout, self.transport.query(*server, name, kind)).await;
                match result {
                    Ok(Ok(answer)) => return Ok(answer),
                    Ok(Err(e)) => last_error = e,
                    Err(_) => last_error = DnsError::Timeout,
                }
                tracing::debug!(
                    target: "dns_task",
                    "{} {} via {} attempt {}/{} failed: {}",
                    kind, name, server, attempt + 1, attempts, last_error
                );
                if attempt + 1 < attempts {
                    tokio::time::sleep(retry_delay(self.retry_delay, attempt)).await;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::dns::fake::{addresses, mx, simple_world, FnTransport};

    fn servers() -> Vec<SocketAddr> {
        vec!["10.0.0.1:53".parse().unwrap(), "10.0.0.2:53".parse().unwrap()]
    }

    fn config() -> Config {
        Config {
            dns_max_retries: 2,
            dns_retry_delay: Duration::from_millis(10),
            ..Config::default()
        }
    }

    fn resolver(transport: Arc<FnTransport>) -> DomainResolver {
        DomainResolver::new(transport, servers(), &config(), Arc::new(DnsCache::new(100)))
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let transport = Arc::new(simple_world(&[]));
        let resolver = resolver(transport.clone());

        let first = resolver.check_domain("Gmail.com").await;
        let calls = transport.call_count();
        let second = resolver.check_domain("gmail.com").await;

        assert!(first.has_mx);
        assert_eq!(first.mail_hosts, vec!["mx.gmail.com".to_string()]);
        assert_eq!(first, second);
        assert_eq!(transport.call_count(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_not_cached() {
        let transport = Arc::new(FnTransport::new(|_, _, _| {
            Err(DnsError::Transient("SERVFAIL".into()))
        }));
        let resolver = resolver(transport.clone());

        let entry = resolver.check_domain("flaky.com").await;
        assert!(!entry.has_mx);
        assert!(entry.is_transient());
        assert_eq!(entry.reason(), "temporary DNS failure");
        assert!(resolver.cache().is_empty());
        // Two servers, two attempts each.
        assert_eq!(transport.call_count(), 4);

        resolver.check_domain("flaky.com").await;
        assert_eq!(transport.call_count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_server_times_out_and_next_server_answers() {
        let first: SocketAddr = "10.0.0.1:53".parse().unwrap();
        let transport = Arc::new(FnTransport::new(move |server, _, kind| {
            if server == first {
                Err(DnsError::Timeout)
            } else if kind == RecordKind::Mx {
                Ok(mx(&[(5, "mx1.corp.com")]))
            } else {
                Ok(LookupAnswer::Empty)
            }
        }));
        let resolver = resolver(transport.clone());

        let entry = resolver.check_domain("corp.com").await;
        assert!(entry.has_mx);
        assert_eq!(transport.call_count(), 3);

        // Only the definitive answer from the second server is kept.
        assert_eq!(resolver.cache().len(), 1);
        let cached = resolver.cache().get("corp.com").unwrap();
        assert!(cached.has_mx);
        assert!(!cached.is_transient());
        assert_eq!(cached.mail_hosts, vec!["mx1.corp.com".to_string()]);

        resolver.check_domain("corp.com").await;
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn evicted_domain_is_resolved_again() {
        let transport = Arc::new(simple_world(&[]));
        let resolver = DomainResolver::new(
            transport.clone(),
            servers(),
            &config(),
            Arc::new(DnsCache::new(2)),
        );

        for domain in ["a.com", "b.com", "c.com"] {
            assert!(resolver.check_domain(domain).await.has_mx);
        }
        assert_eq!(transport.call_count(), 3);
        assert_eq!(resolver.cache().len(), 2);
        assert_eq!(resolver.cache().stats().evictions, 1);

        // c.com is still cached; a.com was the least recently used.
        resolver.check_domain("c.com").await;
        assert_eq!(transport.call_count(), 3);
        resolver.check_domain("a.com").await;
        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test]
    async fn mx_hosts_are_sorted_by_preference() {
        let transport = Arc::new(FnTransport::new(|_, _, _| {
            Ok(mx(&[(20, "backup.corp.com"), (10, "primary.corp.com")]))
        }));
        let entry = resolver(transport).check_domain("corp.com").await;
        assert_eq!(entry.mail_hosts, vec!["primary.corp.com", "backup.corp.com"]);
    }

    #[tokio::test]
    async fn falls_back_to_address_records() {
        let transport = Arc::new(FnTransport::new(|_, _, kind| match kind {
            RecordKind::Mx => Ok(LookupAnswer::Empty),
            RecordKind::A => Ok(LookupAnswer::Empty),
            RecordKind::Aaaa => Ok(addresses(&["2001:db8::1"])),
        }));
        let entry = resolver(transport).check_domain("v6only.org").await;
        assert!(entry.has_mx);
        assert_eq!(entry.mail_hosts, vec!["v6only.org".to_string()]);
    }

    #[tokio::test]
    async fn null_mx_falls_back_to_address_records() {
        let transport = Arc::new(FnTransport::new(|_, _, kind| match kind {
            RecordKind::Mx => Ok(mx(&[(0, "")])),
            _ => Ok(LookupAnswer::Empty),
        }));
        let resolver = resolver(transport);
        let entry = resolver.check_domain("nomail.org").await;
        assert!(!entry.has_mx);
        assert_eq!(entry.reason(), "No MX, A or AAAA records found");
        assert_eq!(resolver.cache().len(), 1);
    }

    #[tokio::test]
    async fn nxdomain_is_definitive() {
        let transport = Arc::new(simple_world(&["ghost.com"]));
        let resolver = resolver(transport.clone());
        let entry = resolver.check_domain("ghost.com").await;
        assert!(!entry.has_mx);
        assert!(entry.reason().contains("NXDOMAIN"));
        assert_eq!(transport.call_count(), 1);
        assert!(resolver.cache().get("ghost.com").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_address_fallback_is_not_cached() {
        let transport = Arc::new(FnTransport::new(|_, _, kind| match kind {
            RecordKind::Mx => Ok(LookupAnswer::Empty),
            _ => Err(DnsError::Timeout),
        }));
        let resolver = resolver(transport);
        let entry = resolver.check_domain("half.org").await;
        assert!(entry.is_transient());
        assert!(resolver.cache().is_empty());
    }
}
