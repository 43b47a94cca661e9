//! Defines the error types for the email-vetter application.
//!
//! Two layers live here: [`AppError`] covers set-up and I/O failures that stop
//! the tool, while [`StageFailure`] is the per-email taxonomy that every
//! validation stage reports as a value.

use crate::core::models::{Category, Stage};
use std::{io, net::AddrParseError};
use thiserror::Error;

/// The primary error type for loading, configuring and running the tool.
#[derive(Error, Debug)]
pub enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error initializing necessary components (e.g., resolvers, TLS roots).
    #[error("Initialization Error: {0}")]
    Initialization(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing the TOML configuration file.
    #[error("TOML Error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Error downloading a domain list.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// Error parsing an IP address or socket address.
    #[error("Address Parsing Error: {0}")]
    AddrParse(#[from] AddrParseError),

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Why a single email stopped short of `valid`.
///
/// Stages never raise: each one returns either success or one of these
/// variants, and the orchestrator turns the variant into an outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageFailure {
    /// Malformed address. Permanent, never retried.
    #[error("{0}")]
    Syntax(String),

    /// Domain (or a parent domain) is on the disposable blocklist.
    #[error("Disposable email domain")]
    DisposableDomain,

    /// NXDOMAIN or no usable MX/A/AAAA records. Permanent and cacheable.
    #[error("{0}")]
    DnsPermanent(String),

    /// DNS timeouts or server errors that outlived the retry budget.
    #[error("{0}")]
    DnsTransient(String),

    /// The mail server refused the mailbox (550-class).
    #[error("{message}")]
    SmtpPermanentRejection { code: u16, message: String },

    /// Mailbox exists but cannot currently receive (552).
    #[error("{message}")]
    SmtpMailboxFull { code: u16, message: String },

    /// Greylisting, 4xx replies, connection errors, or TLS that never worked.
    #[error("{message}")]
    SmtpTransient { code: u16, message: String },

    /// The domain accepts any local part; individual results are unreliable.
    #[error("{0}")]
    CatchAllDetected(String),

    /// The global per-email budget ran out.
    #[error("Validation exceeded {0:?} budget")]
    TimeoutExceeded(std::time::Duration),
}

impl StageFailure {
    /// The outcome category this failure maps to.
    pub fn category(&self) -> Category {
        match self {
            StageFailure::Syntax(_)
            | StageFailure::DisposableDomain
            | StageFailure::DnsPermanent(_)
            | StageFailure::SmtpPermanentRejection { .. } => Category::Invalid,
            StageFailure::SmtpMailboxFull { .. } | StageFailure::CatchAllDetected(_) => {
                Category::Risk
            }
            StageFailure::DnsTransient(_)
            | StageFailure::SmtpTransient { .. }
            | StageFailure::TimeoutExceeded(_) => Category::Unknown,
        }
    }

    /// The stage that produced this failure.
    pub fn stage(&self) -> Stage {
        match self {
            StageFailure::Syntax(_) => Stage::Syntax,
            StageFailure::DisposableDomain => Stage::Disposable,
            StageFailure::DnsPermanent(_) | StageFailure::DnsTransient(_) => Stage::Dns,
            StageFailure::SmtpPermanentRejection { .. }
            | StageFailure::SmtpMailboxFull { .. }
            | StageFailure::SmtpTransient { .. } => Stage::Smtp,
            StageFailure::CatchAllDetected(_) => Stage::CatchAll,
            StageFailure::TimeoutExceeded(_) => Stage::Timeout,
        }
    }

    /// SMTP reply code carried by the failure, if any.
    pub fn smtp_code(&self) -> Option<u16> {
        match self {
            StageFailure::SmtpPermanentRejection { code, .. }
            | StageFailure::SmtpMailboxFull { code, .. }
            | StageFailure::SmtpTransient { code, .. } => Some(*code).filter(|c| *c != 0),
            _ => None,
        }
    }

    /// Whether retrying the same stage could produce a different answer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StageFailure::DnsTransient(_)
                | StageFailure::SmtpTransient { .. }
                | StageFailure::TimeoutExceeded(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn permanent_failures_are_invalid() {
        assert_eq!(
            StageFailure::Syntax("bad".into()).category(),
            Category::Invalid
        );
        assert_eq!(StageFailure::DisposableDomain.stage(), Stage::Disposable);
        let rejected = StageFailure::SmtpPermanentRejection {
            code: 550,
            message: "no such user".into(),
        };
        assert_eq!(rejected.category(), Category::Invalid);
        assert_eq!(rejected.smtp_code(), Some(550));
        assert!(!rejected.is_transient());
    }

    #[test]
    fn transient_failures_are_unknown() {
        let timeout = StageFailure::TimeoutExceeded(Duration::from_secs(30));
        assert_eq!(timeout.category(), Category::Unknown);
        assert_eq!(timeout.stage(), Stage::Timeout);
        assert!(timeout.is_transient());

        let conn = StageFailure::SmtpTransient {
            code: 0,
            message: "connection refused".into(),
        };
        assert_eq!(conn.smtp_code(), None);
    }

    #[test]
    fn catch_all_is_risk() {
        let failure = StageFailure::CatchAllDetected("accepts anything".into());
        assert_eq!(failure.category(), Category::Risk);
        assert_eq!(failure.stage(), Stage::CatchAll);
    }
}
