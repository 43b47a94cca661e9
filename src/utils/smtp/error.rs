//! Errors raised while talking to a mail exchanger.
//!
//! These never leave the SMTP layer; [`super::client::MailboxProber`] turns
//! them into a [`super::result::ProbeStatus`].

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Could not connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("All {0} proxies failed")]
    ProxiesExhausted(usize),

    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(Duration, &'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS negotiation failed: {0}")]
    Tls(String),

    #[error("Malformed SMTP reply: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_target() {
        let err = ProbeError::Connect {
            host: "mx.example.org".into(),
            port: 25,
            reason: "refused".into(),
        };
        assert_eq!(err.to_string(), "Could not connect to mx.example.org:25: refused");
        assert_eq!(ProbeError::ProxiesExhausted(3).to_string(), "All 3 proxies failed");
    }
}
