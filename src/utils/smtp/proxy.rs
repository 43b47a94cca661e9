//! Outbound connection strategies for SMTP probes: direct TCP or a
//! round-robin pool of SOCKS5 proxies.
//!
//! Dialers take their turn at the [`RateGate`] before opening a socket, so a
//! queue of probes for one mail host never holds idle connections.

use super::error::ProbeError;
use super::rate_limit::RateGate;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

/// A connected stream plus a label for where it originates, used to key
/// rate limiting.
pub struct DialedStream {
    pub stream: TcpStream,
    pub via: String,
}

pub trait Dialer: Send + Sync {
    /// Connects to `host:port`, waiting on `gate` under the key of the route
    /// actually used, immediately before each connection attempt.
    fn dial<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        timeout: Duration,
        gate: &'a RateGate,
    ) -> BoxFuture<'a, Result<DialedStream, ProbeError>>;
}

pub const DIRECT_ROUTE: &str = "direct";

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectDialer;

impl Dialer for DirectDialer {
    fn dial<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        timeout: Duration,
        gate: &'a RateGate,
    ) -> BoxFuture<'a, Result<DialedStream, ProbeError>> {
        Box::pin(async move {
            gate.wait(&RateGate::key(DIRECT_ROUTE, host)).await;
            let connect_err = |reason: String| ProbeError::Connect {
                host: host.to_string(),
                port,
                reason,
            };
            let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
                .await
                .map_err(|_| connect_err(format!("timed out after {:?}", timeout)))?
                .map_err(|e| connect_err(e.to_string()))?;
            Ok(DialedStream {
                stream,
                via: DIRECT_ROUTE.to_string(),
            })
        })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

impl ProxyEndpoint {
    /// Parses `host:port` or `host:port@user:password`.
    pub fn parse(entry: &str) -> Result<Self, String> {
        let entry = entry.trim();
        let (address, credentials) = match entry.split_once('@') {
            Some((address, auth)) => {
                let (user, password) = auth
                    .split_once(':')
                    .ok_or_else(|| "credentials must be user:password".to_string())?;
                if user.is_empty() {
                    return Err("proxy user name is empty".to_string());
                }
                (address, Some((user.to_string(), password.to_string())))
            }
            None => (entry, None),
        };

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| "expected host:port".to_string())?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err("proxy host is empty".to_string());
        }
        let port: u16 = port
            .parse()
            .map_err(|_| format!("invalid proxy port '{}'", port))?;
        if port == 0 {
            return Err("proxy port must be non-zero".to_string());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            credentials,
        })
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, tokio_socks::Error> {
        let proxy = (self.host.as_str(), self.port);
        let stream = match &self.credentials {
            Some((user, password)) => {
                Socks5Stream::connect_with_password(proxy, (host, port), user, password).await?
            }
            None => Socks5Stream::connect(proxy, (host, port)).await?,
        };
        Ok(stream.into_inner())
    }
}

impl fmt::Debug for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.credentials.as_ref().map(|(u, _)| u))
            .finish()
    }
}

/// Hands out proxies in rotation. A proxy that fails to connect or
/// authenticate is skipped in favour of the next one, up to one full turn.
#[derive(Debug)]
pub struct ProxyPool {
    proxies: Vec<ProxyEndpoint>,
    next: Mutex<usize>,
}

impl ProxyPool {
    /// Returns `None` for an empty list.
    pub fn from_entries(entries: &[String]) -> Result<Option<Self>, String> {
        if entries.is_empty() {
            return Ok(None);
        }
        let proxies = entries
            .iter()
            .map(|e| ProxyEndpoint::parse(e).map_err(|r| format!("'{}': {}", e, r)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Self::new(proxies)))
    }

    pub fn new(proxies: Vec<ProxyEndpoint>) -> Self {
        Self {
            proxies,
            next: Mutex::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    fn next_index(&self) -> usize {
        let mut next = self.next.lock();
        let index = *next % self.proxies.len().max(1);
        *next = index + 1;
        index
    }
}

impl Dialer for ProxyPool {
    fn dial<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        timeout: Duration,
        gate: &'a RateGate,
    ) -> BoxFuture<'a, Result<DialedStream, ProbeError>> {
        Box::pin(async move {
            for _ in 0..self.proxies.len() {
                let proxy = &self.proxies[self.next_index()];
                gate.wait(&RateGate::key(&proxy.label(), host)).await;
                match tokio::time::timeout(timeout, proxy.connect(host, port)).await {
                    Ok(Ok(stream)) => {
                        return Ok(DialedStream {
                            stream,
                            via: proxy.label(),
                        })
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(target: "smtp_task", "Proxy {} failed for {}:{}: {}", proxy.label(), host, port, e);
                    }
                    Err(_) => {
                        tracing::warn!(target: "smtp_task", "Proxy {} timed out for {}:{}", proxy.label(), host, port);
                    }
                }
            }
            Err(ProbeError::ProxiesExhausted(self.proxies.len()))
        })
    }
}
