//! Single-server DNS queries.
//!
//! [`DnsTransport`] asks one named server for one record type and reports
//! whether the name exists, has no data, or could not be answered. Retries,
//! server rotation and caching live in [`super::resolver`].

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::TokioAsyncResolver;

const DNS_PORT: u16 = 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Mx,
    A,
    Aaaa,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RecordKind::Mx => "MX",
            RecordKind::A => "A",
            RecordKind::Aaaa => "AAAA",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub preference: u16,
    /// Exchange host without the trailing root dot. Empty for a null MX.
    pub exchange: String,
}

/// A definitive answer from one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupAnswer {
    Mx(Vec<MxRecord>),
    Addresses(Vec<IpAddr>),
    /// The name exists but has no records of the requested type.
    Empty,
    /// The name does not exist.
    NxDomain,
}

/// A failure that says nothing about the domain itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DnsError {
    #[error("DNS query timed out")]
    Timeout,
    #[error("DNS query failed: {0}")]
    Transient(String),
}

pub trait DnsTransport: Send + Sync {
    fn query<'a>(
        &'a self,
        server: SocketAddr,
        name: &'a str,
        kind: RecordKind,
    ) -> BoxFuture<'a, Result<LookupAnswer, DnsError>>;
}

/// Accepts `ip`, `ip:port` or `[v6]:port`; a bare IP gets port 53.
pub fn parse_server_addr(server: &str) -> Result<SocketAddr, AddrParseError> {
    let server = server.trim();
    match server.parse::<SocketAddr>() {
        Ok(addr) => Ok(addr),
        Err(_) => server
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, DNS_PORT)),
    }
}

/// Production transport backed by one trust-dns resolver per server.
pub struct TrustDnsTransport {
    resolvers: HashMap<SocketAddr, TokioAsyncResolver>,
}

impl TrustDnsTransport {
    pub fn new(servers: &[SocketAddr], timeout: Duration) -> Self {
        let resolvers = servers
            .iter()
            .map(|addr| {
                let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
                let config = ResolverConfig::from_parts(None, vec![], group);
                let mut opts = ResolverOpts::default();
                opts.timeout = timeout;
                opts.attempts = 1;
                opts.cache_size = 0;
                opts.use_hosts_file = false;
                (*addr, TokioAsyncResolver::tokio(config, opts))
            })
            .collect();
        Self { resolvers }
    }
}

impl DnsTransport for TrustDnsTransport {
    fn query<'a>(
        &'a self,
        server: SocketAddr,
        name: &'a str,
        kind: RecordKind,
    ) -> BoxFuture<'a, Result<LookupAnswer, DnsError>> {
        Box::pin(async move {
            let resolver = self
                .resolvers
                .get(&server)
                .ok_or_else(|| DnsError::Transient(format!("no resolver configured for {}", server)))?;
            let fqdn = if name.ends_with('.') {
                name.to_string()
            } else {
                format!("{}.", name)
            };

            match kind {
                RecordKind::Mx => match resolver.mx_lookup(fqdn.as_str()).await {
                    Ok(lookup) => {
                        let records: Vec<MxRecord> = lookup
                            .iter()
                            .map(|mx| MxRecord {
                                preference: mx.preference(),
                                exchange: mx.exchange().to_utf8().trim_end_matches('.').to_lowercase(),
                            })
                            .collect();
                        Ok(non_empty(records, LookupAnswer::Mx))
                    }
                    Err(e) => classify_error(e),
                },
                RecordKind::A => match resolver.ipv4_lookup(fqdn.as_str()).await {
                    Ok(lookup) => {
                        let ips: Vec<IpAddr> = lookup.iter().map(|a| IpAddr::V4(a.0)).collect();
                        Ok(non_empty(ips, LookupAnswer::Addresses))
                    }
                    Err(e) => classify_error(e),
                },
                RecordKind::Aaaa => match resolver.ipv6_lookup(fqdn.as_str()).await {
                    Ok(lookup) => {
                        let ips: Vec<IpAddr> = lookup.iter().map(|a| IpAddr::V6(a.0)).collect();
                        Ok(non_empty(ips, LookupAnswer::Addresses))
                    }
                    Err(e) => classify_error(e),
                },
            }
        })
    }
}

fn non_empty<T>(items: Vec<T>, wrap: fn(Vec<T>) -> LookupAnswer) -> LookupAnswer {
    if items.is_empty() {
        LookupAnswer::Empty
    } else {
        wrap(items)
    }
}

fn classify_error(err: ResolveError) -> Result<LookupAnswer, DnsError> {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => match *response_code {
            ResponseCode::NXDomain => Ok(LookupAnswer::NxDomain),
            ResponseCode::NoError => Ok(LookupAnswer::Empty),
            code => Err(DnsError::Transient(format!("server answered {}", code))),
        },
        ResolveErrorKind::Timeout => Err(DnsError::Timeout),
        _ => Err(DnsError::Transient(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_addresses() {
        assert_eq!(
            parse_server_addr("8.8.8.8").unwrap(),
            "8.8.8.8:53".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(parse_server_addr(" 127.0.0.1:5353 ").unwrap().port(), 5353);
        assert_eq!(parse_server_addr("2001:4860:4860::8888").unwrap().port(), 53);
        assert_eq!(parse_server_addr("[::1]:54").unwrap().port(), 54);
        assert!(parse_server_addr("dns.google").is_err());
    }

    #[test]
    fn empty_lookups_collapse_to_empty() {
        assert_eq!(non_empty(Vec::<IpAddr>::new(), LookupAnswer::Addresses), LookupAnswer::Empty);
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(
            non_empty(vec![ip], LookupAnswer::Addresses),
            LookupAnswer::Addresses(vec![ip])
        );
    }

    #[test]
    fn classifies_no_records_by_response_code() {
        use trust_dns_resolver::proto::op::Query;
        use trust_dns_resolver::proto::rr::{Name, RecordType};
        let query = || Box::new(Query::query(Name::root(), RecordType::MX));
        let nx = ResolveError::from(ResolveErrorKind::NoRecordsFound {
            query: query(),
            soa: None,
            negative_ttl: None,
            response_code: ResponseCode::NXDomain,
            trusted: true,
        });
        assert_eq!(classify_error(nx), Ok(LookupAnswer::NxDomain));

        let nodata = ResolveError::from(ResolveErrorKind::NoRecordsFound {
            query: query(),
            soa: None,
            negative_ttl: None,
            response_code: ResponseCode::NoError,
            trusted: true,
        });
        assert_eq!(classify_error(nodata), Ok(LookupAnswer::Empty));

        let servfail = ResolveError::from(ResolveErrorKind::NoRecordsFound {
            query: query(),
            soa: None,
            negative_ttl: None,
            response_code: ResponseCode::ServFail,
            trusted: true,
        });
        assert!(matches!(classify_error(servfail), Err(DnsError::Transient(_))));

        let timeout = ResolveError::from(ResolveErrorKind::Timeout);
        assert_eq!(classify_error(timeout), Err(DnsError::Timeout));
    }
}
