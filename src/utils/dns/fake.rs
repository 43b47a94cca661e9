//! In-memory transport for tests.

use super::transport::{DnsError, DnsTransport, LookupAnswer, MxRecord, RecordKind};
use futures::future::BoxFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Handler = dyn Fn(SocketAddr, &str, RecordKind) -> Result<LookupAnswer, DnsError> + Send + Sync;

/// Answers from a closure and counts every query it receives.
pub(crate) struct FnTransport {
    handler: Box<Handler>,
    delay: Option<Duration>,
    pub(crate) calls: Arc<AtomicUsize>,
}

impl FnTransport {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(SocketAddr, &str, RecordKind) -> Result<LookupAnswer, DnsError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every query sleeps for `delay` before answering.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DnsTransport for FnTransport {
    fn query<'a>(
        &'a self,
        server: SocketAddr,
        name: &'a str,
        kind: RecordKind,
    ) -> BoxFuture<'a, Result<LookupAnswer, DnsError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.handler)(server, name, kind)
        })
    }
}

pub(crate) fn mx(hosts: &[(u16, &str)]) -> LookupAnswer {
    LookupAnswer::Mx(
        hosts
            .iter()
            .map(|(preference, exchange)| MxRecord {
                preference: *preference,
                exchange: exchange.to_string(),
            })
            .collect(),
    )
}

pub(crate) fn addresses(ips: &[&str]) -> LookupAnswer {
    LookupAnswer::Addresses(ips.iter().filter_map(|ip| ip.parse::<IpAddr>().ok()).collect())
}

/// Every domain has a single MX `mx.<domain>`, except names in `missing`,
/// which do not exist.
pub(crate) fn simple_world(missing: &'static [&'static str]) -> FnTransport {
    FnTransport::new(move |_, name, kind| {
        if missing.contains(&name) {
            return Ok(LookupAnswer::NxDomain);
        }
        match kind {
            RecordKind::Mx => {
                let host = format!("mx.{}", name);
                Ok(mx(&[(10, host.as_str())]))
            }
            _ => Ok(LookupAnswer::Empty),
        }
    })
}
