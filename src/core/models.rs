//! Core data structures shared between the pipeline stages and the writer.

use crate::core::error::StageFailure;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Final verdict for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Valid,
    Risk,
    Invalid,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Valid => "valid",
            Category::Risk => "risk",
            Category::Invalid => "invalid",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage that decided the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Syntax,
    Disposable,
    Dns,
    Smtp,
    #[serde(rename = "catchall")]
    CatchAll,
    Timeout,
}

impl Stage {
    const ALL: [Stage; 6] = [
        Stage::Syntax,
        Stage::Disposable,
        Stage::Dns,
        Stage::Smtp,
        Stage::CatchAll,
        Stage::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Syntax => "syntax",
            Stage::Disposable => "disposable",
            Stage::Dns => "dns",
            Stage::Smtp => "smtp",
            Stage::CatchAll => "catchall",
            Stage::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stage a validation has most recently entered, readable from outside
/// the task running it.
#[derive(Debug, Default)]
pub struct StageCell(AtomicU8);

impl StageCell {
    pub fn set(&self, stage: Stage) {
        self.0.store(stage as u8, Ordering::Relaxed);
    }

    pub fn get(&self) -> Stage {
        Stage::ALL
            .get(self.0.load(Ordering::Relaxed) as usize)
            .copied()
            .unwrap_or(Stage::Syntax)
    }
}

/// An address split into its parts.
///
/// The domain is lower-cased for lookups; the local part keeps its original
/// case for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    local: String,
    domain: String,
}

impl EmailAddress {
    /// Splits on the last `@`. Returns `None` when there is no `@` at all;
    /// grammar checks belong to the syntax validator.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (local, domain) = raw.rsplit_once('@')?;
        Some(Self {
            local: local.to_string(),
            domain: domain.to_lowercase(),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// `local@domain` with the domain lower-cased, as sent on the wire.
    pub fn normalized(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }

    /// True for bracketed IP domains such as `[192.0.2.1]`.
    pub fn is_domain_literal(&self) -> bool {
        self.domain.starts_with('[') && self.domain.ends_with(']')
    }
}

/// Case-insensitive identity used to de-duplicate input lists.
pub fn dedup_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The result of validating one address. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub email: String,
    pub category: Category,
    pub reason: String,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp_code: Option<u16>,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl ValidationOutcome {
    pub fn valid(email: &str, stage: Stage, reason: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            email: email.to_string(),
            category: Category::Valid,
            reason: reason.into(),
            stage,
            smtp_code: None,
            elapsed,
        }
    }

    pub fn from_failure(email: &str, failure: &StageFailure, elapsed: Duration) -> Self {
        Self {
            email: email.to_string(),
            category: failure.category(),
            reason: failure.to_string(),
            stage: failure.stage(),
            smtp_code: failure.smtp_code(),
            elapsed,
        }
    }

    pub fn with_smtp_code(mut self, code: u16) -> Self {
        self.smtp_code = Some(code);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.category == Category::Valid
    }

    /// Lower-cased domain of the address, if it has one.
    pub fn domain(&self) -> Option<String> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_lowercase())
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
