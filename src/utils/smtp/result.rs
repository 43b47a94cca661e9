//! Outcome of a single mailbox probe.

use serde::Serialize;

/// How the server answered `RCPT TO` for the target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeStatus {
    /// 250 / 251.
    Accepted,
    /// 550 / 551 / 553: the mailbox does not exist.
    Rejected,
    /// 552.
    FullMailbox,
    /// Any other 4xx, or no usable connection at all.
    TemporaryError,
    /// 530: the server wants STARTTLS first.
    TlsRequired,
    /// 252, policy 5xx such as 554, or a dialogue that ended early.
    Inconclusive,
}

impl ProbeStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            250 | 251 => ProbeStatus::Accepted,
            550 | 551 | 553 => ProbeStatus::Rejected,
            552 => ProbeStatus::FullMailbox,
            530 => ProbeStatus::TlsRequired,
            400..=499 => ProbeStatus::TemporaryError,
            _ => ProbeStatus::Inconclusive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    /// Reply code, 0 when no reply was received.
    pub code: u16,
    pub message: String,
    pub mx_host: String,
    /// `Some(true)` when a random address at the same domain was accepted,
    /// `Some(false)` when it was rejected, `None` when not checked or unclear.
    pub catch_all: Option<bool>,
}

impl ProbeResult {
    pub fn new(status: ProbeStatus, code: u16, message: impl Into<String>, mx_host: &str) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            mx_host: mx_host.to_string(),
            catch_all: None,
        }
    }

    pub fn from_reply(code: u16, message: impl Into<String>, mx_host: &str) -> Self {
        Self::new(ProbeStatus::from_code(code), code, message, mx_host)
    }

    /// No SMTP dialogue could be held with `mx_host`.
    pub fn unreachable(mx_host: &str, reason: impl Into<String>) -> Self {
        Self::new(ProbeStatus::TemporaryError, 0, reason, mx_host)
    }

    pub fn inconclusive(code: u16, message: impl Into<String>, mx_host: &str) -> Self {
        Self::new(ProbeStatus::Inconclusive, code, message, mx_host)
    }

    pub fn is_catch_all(&self) -> bool {
        self.catch_all == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_reply_codes() {
        assert_eq!(ProbeStatus::from_code(250), ProbeStatus::Accepted);
        assert_eq!(ProbeStatus::from_code(251), ProbeStatus::Accepted);
        assert_eq!(ProbeStatus::from_code(550), ProbeStatus::Rejected);
        assert_eq!(ProbeStatus::from_code(553), ProbeStatus::Rejected);
        assert_eq!(ProbeStatus::from_code(552), ProbeStatus::FullMailbox);
        assert_eq!(ProbeStatus::from_code(450), ProbeStatus::TemporaryError);
        assert_eq!(ProbeStatus::from_code(421), ProbeStatus::TemporaryError);
        assert_eq!(ProbeStatus::from_code(530), ProbeStatus::TlsRequired);
        assert_eq!(ProbeStatus::from_code(252), ProbeStatus::Inconclusive);
        assert_eq!(ProbeStatus::from_code(554), ProbeStatus::Inconclusive);
    }

    #[test]
    fn unreachable_has_no_code() {
        let r = ProbeResult::unreachable("mx.corp.com", "refused");
        assert_eq!(r.status, ProbeStatus::TemporaryError);
        assert_eq!(r.code, 0);
        assert!(!r.is_catch_all());
    }
}
