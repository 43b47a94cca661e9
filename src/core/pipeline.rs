//! Runs one address through syntax, disposable, DNS, SMTP and catch-all
//! checks under a single time budget.

use crate::core::config::{retry_delay, Config};
use crate::core::error::{AppError, Result, StageFailure};
use crate::core::models::{EmailAddress, Stage, StageCell, ValidationOutcome};
use crate::utils::dns::transport::parse_server_addr;
use crate::utils::dns::{DnsCache, DnsTransport, DomainResolver, TrustDnsTransport};
use crate::utils::lru::CacheStats;
use crate::utils::smtp::{
    CatchAllRegistry, Dialer, DirectDialer, MailboxProber, ProbeOptions, ProbeStatus, ProxyPool,
    TlsMode,
};
use crate::verification::{DisposableChecker, SyntaxOptions, SyntaxValidator};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;

/// A stage chain that ended without a failure.
struct Passed {
    stage: Stage,
    reason: String,
    smtp_code: Option<u16>,
}

pub struct Validator {
    config: Arc<Config>,
    syntax: SyntaxValidator,
    disposable: DisposableChecker,
    resolver: DomainResolver,
    prober: Option<MailboxProber>,
    catch_all: CatchAllRegistry,
}

impl Validator {
    /// Production wiring: trust-dns for lookups, and either direct TCP or the
    /// configured SOCKS5 pool for SMTP.
    pub fn new(
        config: Config,
        disposable: Arc<HashSet<String>>,
        tlds: Arc<HashSet<String>>,
    ) -> Result<Self> {
        let servers = parse_servers(&config)?;
        let transport: Arc<dyn DnsTransport> =
            Arc::new(TrustDnsTransport::new(&servers, config.dns_timeout));
        let dialer: Arc<dyn Dialer> = match ProxyPool::from_entries(&config.proxy_list)
            .map_err(|e| AppError::Config(format!("Invalid proxy entry {}", e)))?
        {
            Some(pool) => {
                tracing::info!("Routing SMTP probes through {} SOCKS5 proxies", pool.len());
                Arc::new(pool)
            }
            None => Arc::new(DirectDialer),
        };
        Self::with_transports(config, disposable, tlds, transport, dialer)
    }

    /// Wiring with caller-supplied network transports.
    pub fn with_transports(
        config: Config,
        disposable: Arc<HashSet<String>>,
        tlds: Arc<HashSet<String>>,
        dns: Arc<dyn DnsTransport>,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Self> {
        let servers = parse_servers(&config)?;
        let cache = Arc::new(DnsCache::new(config.dns_cache_max_size));
        let resolver = DomainResolver::new(dns, servers, &config, cache);
        let prober = if config.smtp_enabled {
            Some(MailboxProber::new(&config, dialer)?)
        } else {
            None
        };

        Ok(Self {
            syntax: SyntaxValidator::new(SyntaxOptions::from_config(&config), tlds),
            disposable: DisposableChecker::new(disposable),
            resolver,
            prober,
            catch_all: CatchAllRegistry::new(config.catchall_cache_max_size),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dns_cache_stats(&self) -> CacheStats {
        self.resolver.cache().stats()
    }

    pub fn catch_all_stats(&self) -> CacheStats {
        self.catch_all.stats()
    }

    /// Validates one address. Always returns an outcome; when the global
    /// budget runs out, in-flight lookups and probes are dropped.
    pub async fn validate_one(&self, email: &str) -> ValidationOutcome {
        self.validate_tracked(email, &StageCell::default()).await
    }

    /// Like [`Validator::validate_one`], recording each stage in `progress`
    /// as it is entered.
    pub async fn validate_tracked(&self, email: &str, progress: &StageCell) -> ValidationOutcome {
        let started = Instant::now();
        let email = email.trim();
        let budget = self.config.global_timeout;

        let outcome = match tokio::time::timeout(budget, self.run_stages(email, progress)).await {
            Ok(Ok(passed)) => {
                let outcome = ValidationOutcome::valid(email, passed.stage, passed.reason, started.elapsed());
                match passed.smtp_code {
                    Some(code) => outcome.with_smtp_code(code),
                    None => outcome,
                }
            }
            Ok(Err(failure)) => ValidationOutcome::from_failure(email, &failure, started.elapsed()),
            Err(_) => {
                tracing::warn!(target: "validation", "<{}> exceeded the {:?} budget", email, budget);
                ValidationOutcome::from_failure(email, &StageFailure::TimeoutExceeded(budget), started.elapsed())
            }
        };

        tracing::debug!(target: "validation",
            "<{}> -> {} at {} ({})", email, outcome.category, outcome.stage, outcome.reason);
        outcome
    }

    async fn run_stages(&self, email: &str, progress: &StageCell) -> std::result::Result<Passed, StageFailure> {
        progress.set(Stage::Syntax);
        self.syntax.validate(email)?;
        let address = EmailAddress::parse(email)
            .ok_or_else(|| StageFailure::Syntax("Email must contain @ symbol".into()))?;
        let domain = address.domain();

        let (mail_hosts, dns_reason) = if address.is_domain_literal() {
            (vec![literal_host(domain)], "Domain literal; DNS lookup skipped".to_string())
        } else {
            progress.set(Stage::Disposable);
            if self.disposable.is_disposable(domain) {
                return Err(StageFailure::DisposableDomain);
            }
            progress.set(Stage::Dns);
            let entry = self.resolver.check_domain(domain).await;
            if entry.is_transient() {
                return Err(StageFailure::DnsTransient(entry.reason().to_string()));
            }
            if !entry.has_mx {
                return Err(StageFailure::DnsPermanent(entry.reason().to_string()));
            }
            let reason = format!("Domain has mail exchanger {}", entry.mail_hosts.join(", "));
            (entry.mail_hosts, reason)
        };

        let Some(prober) = &self.prober else {
            return Ok(Passed {
                stage: Stage::Dns,
                reason: dns_reason,
                smtp_code: None,
            });
        };
        progress.set(Stage::Smtp);
        self.probe(prober, &address, &mail_hosts).await
    }

    async fn probe(
        &self,
        prober: &MailboxProber,
        address: &EmailAddress,
        mail_hosts: &[String],
    ) -> std::result::Result<Passed, StageFailure> {
        let domain = address.domain();
        let known = if self.config.catchall_check_enabled {
            self.catch_all.lookup(domain)
        } else {
            None
        };
        if known == Some(true) {
            return Err(StageFailure::CatchAllDetected(format!(
                "{} is a known catch-all domain",
                domain
            )));
        }

        let target = address.normalized();
        let mut options = ProbeOptions {
            tls: TlsMode::Opportunistic,
            check_catch_all: self.config.catchall_check_enabled && known.is_none(),
        };
        let mut attempt = 0u32;
        let mut tls_retried = false;

        loop {
            let result = prober.probe_hosts(&target, mail_hosts, options).await;
            if let Some(flag) = result.catch_all {
                self.catch_all.record(domain, flag);
            }
            if result.is_catch_all() {
                return Err(StageFailure::CatchAllDetected(format!(
                    "Domain accepts any address ({} accepted a random mailbox)",
                    result.mx_host
                )));
            }

            match result.status {
                ProbeStatus::Accepted => {
                    let stage = if result.catch_all == Some(false) || known == Some(false) {
                        Stage::CatchAll
                    } else {
                        Stage::Smtp
                    };
                    return Ok(Passed {
                        stage,
                        reason: format!("Mailbox accepted by {}", result.mx_host),
                        smtp_code: Some(result.code),
                    });
                }
                ProbeStatus::Rejected => {
                    return Err(StageFailure::SmtpPermanentRejection {
                        code: result.code,
                        message: format!("Mailbox rejected: {}", result.message),
                    });
                }
                ProbeStatus::FullMailbox => {
                    return Err(StageFailure::SmtpMailboxFull {
                        code: result.code,
                        message: format!("Mailbox full: {}", result.message),
                    });
                }
                ProbeStatus::TlsRequired if !tls_retried => {
                    tracing::debug!(target: "smtp_task", "{} requires TLS; retrying <{}> with STARTTLS", result.mx_host, target);
                    tls_retried = true;
                    options.tls = TlsMode::Required;
                }
                ProbeStatus::TlsRequired => {
                    return Err(StageFailure::SmtpTransient {
                        code: result.code,
                        message: format!("TLS required but could not be negotiated: {}", result.message),
                    });
                }
                ProbeStatus::TemporaryError if attempt < self.config.smtp_max_retries => {
                    let delay = retry_delay(self.config.smtp_retry_delay, attempt);
                    tracing::debug!(target: "smtp_task",
                        "Temporary SMTP failure for <{}> ({}); retry {} in {:?}",
                        target, result.message, attempt + 1, delay);
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                ProbeStatus::TemporaryError => {
                    tracing::debug!(target: "smtp_task", "Giving up on <{}>: {}", target, result.message);
                    return Err(StageFailure::SmtpTransient {
                        code: result.code,
                        message: "temporary error/timeout".to_string(),
                    });
                }
                ProbeStatus::Inconclusive => {
                    return Err(StageFailure::SmtpTransient {
                        code: result.code,
                        message: format!("Inconclusive SMTP response: {}", result.message),
                    });
                }
            }
        }
    }
}

fn parse_servers(config: &Config) -> Result<Vec<std::net::SocketAddr>> {
    config
        .dns_servers
        .iter()
        .map(|s| parse_server_addr(s).map_err(AppError::from))
        .collect()
}

/// `[192.0.2.1]` -> `192.0.2.1`, `[IPv6:2001:db8::1]` -> `2001:db8::1`.
fn literal_host(domain: &str) -> String {
    let inner = domain.trim_start_matches('[').trim_end_matches(']');
    let inner = inner
        .strip_prefix("IPv6:")
        .or_else(|| inner.strip_prefix("ipv6:"))
        .unwrap_or(inner);
    inner.to_string()
}
