pub mod cache;
pub mod resolver;
pub mod transport;

#[cfg(test)]
pub(crate) mod fake;

pub use cache::{DnsCache, DomainCacheEntry};
pub use resolver::DomainResolver;
pub use transport::{DnsError, DnsTransport, LookupAnswer, RecordKind, TrustDnsTransport};
