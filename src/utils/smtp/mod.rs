pub mod catch_all;
pub mod client;
pub mod error;
pub mod proxy;
pub mod rate_limit;
pub mod result;
pub mod session;
pub mod tls;

#[cfg(test)]
pub(crate) mod mock;

pub use catch_all::CatchAllRegistry;
pub use client::{MailboxProber, ProbeOptions, TlsMode};
pub use error::ProbeError;
pub use proxy::{DialedStream, Dialer, DirectDialer, ProxyEndpoint, ProxyPool};
pub use rate_limit::RateGate;
pub use result::{ProbeResult, ProbeStatus};
