//! Self-hosted email syntax rules.
//!
//! Stricter than RFC 5322 by default: the local part is limited to letters,
//! digits, `.` and `_`, must contain at least one letter, and may not hold more
//! digits than letters. Every relaxation is a configuration switch.

use crate::core::config::Config;
use crate::core::error::StageFailure;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

const MAX_EMAIL_LEN: usize = 254;
const MAX_LOCAL_LEN: usize = 64;
const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Reserved names from RFC 2606 / RFC 6761 plus a few common placeholders.
const RESERVED_DOMAINS: &[&str] = &[
    "test",
    "example",
    "invalid",
    "localhost",
    "example.com",
    "example.net",
    "example.org",
    "test.com",
    "invalid.com",
];

static ASCII_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9-]+$").expect("static label pattern compiles")
});
static ALPHA_TLD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2,}$").expect("static TLD pattern compiles"));

/// Which of the optional relaxations are switched on.
#[derive(Debug, Clone, Default)]
pub struct SyntaxOptions {
    pub allow_smtputf8: bool,
    pub allow_empty_local: bool,
    pub allow_quoted_local: bool,
    pub allow_domain_literal: bool,
    pub allowed_special_domains: HashSet<String>,
    pub allow_plus_addressing: bool,
    pub no_plus_domains: HashSet<String>,
    pub enforce_digit_ratio: bool,
}

impl SyntaxOptions {
    pub fn from_config(config: &Config) -> Self {
        let lower = |v: &[String]| v.iter().map(|d| d.trim().to_lowercase()).collect();
        Self {
            allow_smtputf8: config.allow_smtputf8,
            allow_empty_local: config.allow_empty_local,
            allow_quoted_local: config.allow_quoted_local,
            allow_domain_literal: config.allow_domain_literal,
            allowed_special_domains: lower(&config.allowed_special_domains),
            allow_plus_addressing: config.allow_plus_addressing,
            no_plus_domains: lower(&config.no_plus_domains),
            enforce_digit_ratio: config.enforce_digit_ratio,
        }
    }
}

/// Pure syntax checker. Cheap to clone; the TLD set is shared.
#[derive(Debug, Clone)]
pub struct SyntaxValidator {
    options: SyntaxOptions,
    tlds: Arc<HashSet<String>>,
}

type Check = Result<(), String>;

impl SyntaxValidator {
    /// `tlds` holds lower-case TLDs. An empty set disables the membership check.
    pub fn new(options: SyntaxOptions, tlds: Arc<HashSet<String>>) -> Self {
        if tlds.is_empty() {
            tracing::warn!(target: "validation", "TLD list is empty; TLD membership will not be enforced");
        }
        Self { options, tlds }
    }

    /// Checks `email` and returns the specific rule that failed, if any.
    pub fn validate(&self, email: &str) -> Result<(), StageFailure> {
        self.check(email).map_err(StageFailure::Syntax)
    }

    fn check(&self, email: &str) -> Check {
        let email = email.trim();
        if email.is_empty() {
            return Err("Empty email".into());
        }
        if email.chars().count() > MAX_EMAIL_LEN {
            return Err(format!("Email exceeds {} characters", MAX_EMAIL_LEN));
        }

        let Some((local, domain)) = email.rsplit_once('@') else {
            return Err("Email must contain @ symbol".into());
        };
        if local.contains('@') && !(self.options.allow_quoted_local && is_quoted(local)) {
            return Err("Email must contain exactly one @ symbol".into());
        }

        let domain_lower = domain.to_lowercase();
        self.check_local(local, &domain_lower)
            .map_err(|e| format!("Invalid local part: {}", e))?;
        self.check_domain(domain)
            .map_err(|e| format!("Invalid domain: {}", e))?;
        Ok(())
    }

    fn check_local(&self, local: &str, domain: &str) -> Check {
        if local.is_empty() {
            return if self.options.allow_empty_local {
                Ok(())
            } else {
                Err("Local part is empty".into())
            };
        }
        if local.chars().count() > MAX_LOCAL_LEN {
            return Err(format!("Local part exceeds {} characters", MAX_LOCAL_LEN));
        }
        if is_quoted(local) {
            if !self.options.allow_quoted_local {
                return Err("Quoted local parts not allowed".into());
            }
            return check_quoted(&local[1..local.len() - 1]);
        }
        self.check_dot_atom(local, domain)
    }

    fn check_dot_atom(&self, local: &str, domain: &str) -> Check {
        if local.starts_with('.') || local.ends_with('.') {
            return Err("Local part cannot start or end with dot".into());
        }
        if local.starts_with('_') || local.ends_with('_') {
            return Err("Local part cannot start or end with underscore".into());
        }
        if local.contains("..") {
            return Err("Local part cannot contain consecutive dots".into());
        }

        let mut letters = 0usize;
        let mut digits = 0usize;
        for c in local.chars() {
            match c {
                '.' | '_' => {}
                c if c.is_ascii_alphabetic() => letters += 1,
                c if c.is_ascii_digit() => digits += 1,
                '+' => {
                    if self.options.no_plus_domains.contains(domain) {
                        return Err(format!("Plus addressing is not supported by {}", domain));
                    }
                    if !self.options.allow_plus_addressing {
                        return Err("Invalid character '+' in local part".into());
                    }
                }
                c if !c.is_ascii() => {
                    if !self.options.allow_smtputf8 {
                        return Err("Invalid characters in local part (Unicode not allowed)".into());
                    }
                    if c.is_alphabetic() {
                        letters += 1;
                    } else if c.is_numeric() {
                        digits += 1;
                    } else {
                        return Err(format!("Invalid character '{}' in local part", c));
                    }
                }
                c => return Err(format!("Invalid character '{}' in local part", c)),
            }
        }

        if self.options.enforce_digit_ratio {
            if letters == 0 {
                return Err(format!(
                    "Local part must contain at least one letter ({} digits, {} letters)",
                    digits, letters
                ));
            }
            if digits > letters {
                return Err(format!(
                    "Local part has more digits than letters ({} digits, {} letters)",
                    digits, letters
                ));
            }
        }
        Ok(())
    }

    fn check_domain(&self, domain: &str) -> Check {
        if domain.is_empty() {
            return Err("Domain is empty".into());
        }
        if domain.chars().count() > MAX_DOMAIN_LEN {
            return Err(format!("Domain exceeds {} characters", MAX_DOMAIN_LEN));
        }
        if domain.starts_with('[') && domain.ends_with(']') {
            if !self.options.allow_domain_literal {
                return Err("Domain literals not allowed".into());
            }
            return check_domain_literal(&domain[1..domain.len() - 1]);
        }

        let lower = domain.to_lowercase();
        if self.options.allowed_special_domains.contains(&lower) {
            return Ok(());
        }
        if RESERVED_DOMAINS.contains(&lower.as_str()) {
            return Err(format!("Reserved domain '{}' not allowed", domain));
        }
        if !domain.contains('.') {
            return Err("Domain must contain at least one dot (TLD required)".into());
        }
        if domain.starts_with('.') || domain.ends_with('.') {
            return Err("Domain cannot start or end with dot".into());
        }

        let labels: Vec<&str> = domain.split('.').collect();
        for label in &labels {
            self.check_label(label)?;
        }

        // `labels` has at least two entries because the domain contains a dot.
        let tld = labels[labels.len() - 1];
        let tld_lower = tld.to_lowercase();
        if tld.chars().count() < 2 {
            return Err(format!("TLD '{}' must be at least 2 characters", tld));
        }
        let punycode_tld = tld_lower.starts_with("xn--") && self.tlds.contains(&tld_lower);
        if !ALPHA_TLD.is_match(tld) && !punycode_tld {
            return Err(format!("TLD '{}' must contain only letters", tld));
        }
        if !self.tlds.is_empty() && !self.tlds.contains(&tld_lower) {
            return Err(format!("Unknown TLD '{}'", tld));
        }
        Ok(())
    }

    fn check_label(&self, label: &str) -> Check {
        if label.is_empty() {
            return Err("Domain contains empty label (consecutive dots)".into());
        }
        if label.chars().count() > MAX_LABEL_LEN {
            return Err(format!(
                "Domain label '{}' exceeds {} characters",
                label, MAX_LABEL_LEN
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!(
                "Domain label '{}' cannot start or end with hyphen",
                label
            ));
        }
        let ok = if self.options.allow_smtputf8 {
            label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || (!c.is_ascii() && c.is_alphanumeric()))
        } else {
            ASCII_LABEL.is_match(label)
        };
        if !ok {
            return Err(format!("Invalid characters in domain label '{}'", label));
        }
        Ok(())
    }

    /// Lower-cased domain part, or `None` when there is no `@`.
    pub fn extract_domain(email: &str) -> Option<String> {
        email
            .trim()
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_lowercase())
    }
}

fn is_quoted(local: &str) -> bool {
    local.len() >= 2 && local.starts_with('"') && local.ends_with('"')
}

fn check_quoted(content: &str) -> Check {
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) if escaped.is_ascii() => {}
                _ => return Err("Invalid escape in quoted local part".into()),
            },
            '"' => return Err("Unescaped quote in quoted local part".into()),
            c if c.is_control() => {
                return Err("Invalid characters in quoted local part".into())
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_domain_literal(inner: &str) -> Check {
    let parsed = match inner.strip_prefix("IPv6:") {
        Some(v6) => v6.parse::<Ipv6Addr>().is_ok(),
        None => inner.parse::<Ipv4Addr>().is_ok(),
    };
    if parsed {
        Ok(())
    } else {
        Err(format!("Invalid domain literal '[{}]'", inner))
    }
}
