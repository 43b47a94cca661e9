//! Mailbox existence probing via `RCPT TO`, with optional catch-all
//! detection in the same session.

use super::error::ProbeError;
use super::proxy::{DialedStream, Dialer};
use super::rate_limit::RateGate;
use super::result::{ProbeResult, ProbeStatus};
use super::session::{SmtpReply, SmtpSession};
use super::tls;
use crate::core::config::Config;
use crate::core::error::{AppError, Result};

use lettre::transport::smtp::commands::{Ehlo, Mail, Rcpt, Rset, Starttls};
use lettre::transport::smtp::extension::ClientId;
use lettre::Address;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_rustls::TlsConnector;

const RANDOM_LOCAL_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Upgrade when the server advertises STARTTLS; fall back to plaintext
    /// if the handshake fails.
    Opportunistic,
    /// Refuse to probe without STARTTLS.
    Required,
    Disabled,
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    pub tls: TlsMode,
    pub check_catch_all: bool,
}

pub struct MailboxProber {
    dialer: Arc<dyn Dialer>,
    rate_gate: RateGate,
    tls: TlsConnector,
    ports: Vec<u16>,
    timeout: Duration,
    sender: Address,
    helo: String,
    catchall_probe_count: usize,
    max_mx_hosts: usize,
}

impl MailboxProber {
    pub fn new(config: &Config, dialer: Arc<dyn Dialer>) -> Result<Self> {
        let sender = Address::from_str(&config.smtp_sender_email).map_err(|e| {
            AppError::Config(format!(
                "Invalid smtp_sender_email '{}': {}",
                config.smtp_sender_email, e
            ))
        })?;
        Ok(Self {
            dialer,
            rate_gate: RateGate::new(config.smtp_rate_limit_interval),
            tls: tls::build_connector(),
            ports: config.smtp_ports.clone(),
            timeout: config.smtp_timeout,
            sender,
            helo: config.smtp_helo_name.clone(),
            catchall_probe_count: config.catchall_probe_count.max(1),
            max_mx_hosts: config.smtp_max_mx_hosts.max(1),
        })
    }

    /// Probes the mail hosts in order, moving on only while hosts are
    /// unreachable.
    pub async fn probe_hosts(&self, email: &str, mx_hosts: &[String], options: ProbeOptions) -> ProbeResult {
        let mut last = ProbeResult::unreachable("", "no mail hosts to probe");
        for host in mx_hosts.iter().take(self.max_mx_hosts) {
            let result = self.probe_mailbox(email, host, options).await;
            if !(result.status == ProbeStatus::TemporaryError && result.code == 0) {
                return result;
            }
            tracing::debug!(target: "smtp_task", "Mail host {} unusable for <{}>: {}", host, email, result.message);
            last = result;
        }
        last
    }

    /// Probes `email` at one mail exchanger, trying each configured port.
    pub async fn probe_mailbox(&self, email: &str, mx_host: &str, options: ProbeOptions) -> ProbeResult {
        let mut last_error: Option<ProbeError> = None;

        for &port in &self.ports {
            tracing::debug!(target: "smtp_task", "Probing <{}> via {}:{} ({:?})", email, mx_host, port, options.tls);
            match self.probe_port(email, mx_host, port, options.tls, options.check_catch_all).await {
                Ok(result) => return result,
                Err(ProbeError::Tls(reason)) if options.tls == TlsMode::Opportunistic => {
                    tracing::warn!(target: "smtp_task",
                        "STARTTLS with {}:{} failed ({}); retrying in plaintext", mx_host, port, reason);
                    match self
                        .probe_port(email, mx_host, port, TlsMode::Disabled, options.check_catch_all)
                        .await
                    {
                        Ok(result) => return result,
                        Err(e) => last_error = Some(e),
                    }
                }
                Err(e) => {
                    tracing::debug!(target: "smtp_task", "{}:{} failed for <{}>: {}", mx_host, port, email, e);
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no SMTP ports configured".to_string());
        ProbeResult::unreachable(mx_host, reason)
    }

    async fn probe_port(
        &self,
        email: &str,
        host: &str,
        port: u16,
        tls_mode: TlsMode,
        check_catch_all: bool,
    ) -> std::result::Result<ProbeResult, ProbeError> {
        let DialedStream { stream, via } = self
            .dialer
            .dial(host, port, self.timeout, &self.rate_gate)
            .await?;
        tracing::trace!(target: "smtp_task", "Connected to {}:{} via {}", host, port, via);

        let mut session = SmtpSession::new(stream, self.timeout);
        let outcome = self
            .converse(&mut session, email, host, tls_mode, check_catch_all)
            .await;
        session.close().await;
        outcome
    }

    async fn converse(
        &self,
        session: &mut SmtpSession,
        email: &str,
        host: &str,
        tls_mode: TlsMode,
        check_catch_all: bool,
    ) -> std::result::Result<ProbeResult, ProbeError> {
        let greeting = session.read_reply().await?;
        if greeting.code != 220 {
            return Ok(refusal(greeting.code, "Greeting", &greeting.message(), host));
        }

        let ehlo = self.greet(session).await?;
        if !ehlo.is_positive() {
            return Ok(refusal(ehlo.code, "HELO", &ehlo.message(), host));
        }

        let starttls = ehlo.has_capability("STARTTLS");
        match (tls_mode, starttls) {
            (TlsMode::Required, false) => {
                return Ok(ProbeResult::inconclusive(
                    0,
                    format!("STARTTLS required but not offered by {}", host),
                    host,
                ));
            }
            (TlsMode::Required, true) | (TlsMode::Opportunistic, true) => {
                let reply = session.send(&Starttls.to_string()).await?;
                if reply.code == 220 {
                    session.upgrade(&self.tls, host).await?;
                    let ehlo = self.greet(session).await?;
                    if !ehlo.is_positive() {
                        return Ok(refusal(ehlo.code, "EHLO after STARTTLS", &ehlo.message(), host));
                    }
                } else if tls_mode == TlsMode::Required {
                    return Ok(ProbeResult::inconclusive(
                        reply.code,
                        format!("STARTTLS refused: {}", reply.message()),
                        host,
                    ));
                }
            }
            _ => {}
        }

        let mail = session
            .send(&Mail::new(Some(self.sender.clone()), vec![]).to_string())
            .await?;
        if !mail.is_positive() {
            return Ok(refusal(mail.code, "MAIL FROM", &mail.message(), host));
        }

        let rcpt = session.send(&rcpt_command(email)).await?;
        let mut result = ProbeResult::from_reply(rcpt.code, rcpt.message(), host);
        tracing::debug!(target: "smtp_task",
            "RCPT <{}> at {} -> {} {:?} (tls: {})", email, host, rcpt.code, result.status, session.is_secure());

        if check_catch_all && matches!(result.status, ProbeStatus::Accepted | ProbeStatus::Rejected) {
            let domain = email.rsplit_once('@').map(|(_, d)| d).unwrap_or_default();
            result.catch_all = self.detect_catch_all(session, domain, host).await;
        }
        Ok(result)
    }

    async fn greet(&self, session: &mut SmtpSession) -> std::result::Result<SmtpReply, ProbeError> {
        let ehlo = session
            .send(&Ehlo::new(ClientId::Domain(self.helo.clone())).to_string())
            .await?;
        if ehlo.is_positive() {
            return Ok(ehlo);
        }
        session.send(&format!("HELO {}\r\n", self.helo)).await
    }

    /// Sends `RCPT TO` for freshly generated addresses in the open session.
    async fn detect_catch_all(&self, session: &mut SmtpSession, domain: &str, host: &str) -> Option<bool> {
        let mut verdict = None;
        for _ in 0..self.catchall_probe_count {
            let probe = random_address(domain);
            match session.send(&rcpt_command(&probe)).await {
                Ok(reply) if reply.is_positive() => {
                    tracing::info!(target: "smtp_task", "{} accepted random address <{}>; domain is catch-all", host, probe);
                    verdict = Some(true);
                    break;
                }
                Ok(reply) if ProbeStatus::from_code(reply.code) == ProbeStatus::Rejected => {
                    verdict = Some(false);
                }
                Ok(reply) => {
                    tracing::debug!(target: "smtp_task", "Catch-all probe at {} unclear: {}", host, reply.code);
                }
                Err(e) => {
                    tracing::debug!(target: "smtp_task", "Catch-all probe at {} failed: {}", host, e);
                    return verdict;
                }
            }
        }
        if let Err(e) = session.send(&Rset.to_string()).await {
            tracing::trace!(target: "smtp_task", "RSET failed: {}", e);
        }
        verdict
    }
}

/// Reply to anything before `RCPT TO` that was not positive.
fn refusal(code: u16, step: &str, message: &str, host: &str) -> ProbeResult {
    let message = format!("{} rejected by {}: {} {}", step, host, code, message);
    match ProbeStatus::from_code(code) {
        status @ (ProbeStatus::TemporaryError | ProbeStatus::TlsRequired) => {
            ProbeResult::new(status, code, message, host)
        }
        _ => ProbeResult::inconclusive(code, message, host),
    }
}

fn rcpt_command(address: &str) -> String {
    match Address::from_str(address) {
        Ok(addr) => Rcpt::new(addr, vec![]).to_string(),
        Err(_) => format!("RCPT TO:<{}>\r\n", address),
    }
}

/// An address at `domain` that almost certainly does not exist.
pub fn random_address(domain: &str) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_LOCAL_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("verify{}@{}", token, domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::smtp::mock;
    use crate::utils::smtp::proxy::DirectDialer;

    fn prober(port: u16) -> MailboxProber {
        let config = Config {
            smtp_enabled: true,
            smtp_ports: vec![port],
            smtp_timeout: Duration::from_secs(5),
            smtp_rate_limit_interval: Duration::ZERO,
            ..Config::default()
        };
        MailboxProber::new(&config, Arc::new(DirectDialer)).unwrap()
    }

    const PLAIN: ProbeOptions = ProbeOptions {
        tls: TlsMode::Opportunistic,
        check_catch_all: false,
    };

    #[test]
    fn random_addresses_are_long_and_fresh() {
        let a = random_address("corp.com");
        let b = random_address("corp.com");
        let local = a.split('@').next().unwrap();
        assert!(local.len() >= RANDOM_LOCAL_LEN);
        assert!(a.ends_with("@corp.com"));
        assert_ne!(a, b);
    }

    #[test]
    fn rcpt_command_framing() {
        assert_eq!(rcpt_command("a@b.com"), "RCPT TO:<a@b.com>\r\n");
    }

    #[tokio::test]
    async fn accepted_and_rejected_mailboxes() {
        let server = mock::start(|addr| {
            if addr.starts_with("alice@") {
                "250 2.1.5 OK".to_string()
            } else {
                "550 5.1.1 No such user".to_string()
            }
        })
        .await;
        let prober = prober(server.port);

        let ok = prober.probe_mailbox("alice@corp.com", "127.0.0.1", PLAIN).await;
        assert_eq!(ok.status, ProbeStatus::Accepted);
        assert_eq!(ok.code, 250);

        let gone = prober.probe_mailbox("bob@corp.com", "127.0.0.1", PLAIN).await;
        assert_eq!(gone.status, ProbeStatus::Rejected);
        assert_eq!(gone.code, 550);
        assert!(gone.message.contains("No such user"));

        // Every session ends with QUIT.
        assert_eq!(server.sessions(), 2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.quits(), 2);
    }

    #[tokio::test]
    async fn maps_full_and_temporary_replies() {
        let server = mock::start(|addr| {
            if addr.starts_with("full@") {
                "552 5.2.2 Mailbox full".to_string()
            } else {
                "451 4.7.1 Greylisted".to_string()
            }
        })
        .await;
        let prober = prober(server.port);
        let full = prober.probe_mailbox("full@corp.com", "127.0.0.1", PLAIN).await;
        assert_eq!(full.status, ProbeStatus::FullMailbox);
        let grey = prober.probe_mailbox("grey@corp.com", "127.0.0.1", PLAIN).await;
        assert_eq!(grey.status, ProbeStatus::TemporaryError);
        assert_eq!(grey.code, 451);
    }

    #[tokio::test]
    async fn detects_catch_all_in_same_session() {
        let server = mock::start(|_| "250 2.1.5 OK".to_string()).await;
        let prober = prober(server.port);
        let options = ProbeOptions {
            check_catch_all: true,
            ..PLAIN
        };
        let result = prober.probe_mailbox("anyone@corp.com", "127.0.0.1", options).await;
        assert_eq!(result.status, ProbeStatus::Accepted);
        assert!(result.is_catch_all());
        assert_eq!(server.sessions(), 1);
        assert_eq!(server.rcpts(), 2);
    }

    #[tokio::test]
    async fn strict_domain_is_not_catch_all() {
        let server = mock::start(|addr| {
            if addr.starts_with("verify") {
                "550 5.1.1 Unknown".to_string()
            } else {
                "250 OK".to_string()
            }
        })
        .await;
        let prober = prober(server.port);
        let options = ProbeOptions {
            check_catch_all: true,
            ..PLAIN
        };
        let result = prober.probe_mailbox("real@corp.com", "127.0.0.1", options).await;
        assert_eq!(result.catch_all, Some(false));
    }

    #[tokio::test]
    async fn tls_required_on_mail_from() {
        let server = mock::start_with("530 5.7.0 Must issue a STARTTLS command first", |_| {
            "250 OK".to_string()
        })
        .await;
        let prober = prober(server.port);
        let result = prober.probe_mailbox("a@corp.com", "127.0.0.1", PLAIN).await;
        assert_eq!(result.status, ProbeStatus::TlsRequired);
        assert_eq!(result.code, 530);

        let required = ProbeOptions {
            tls: TlsMode::Required,
            ..PLAIN
        };
        let result = prober.probe_mailbox("a@corp.com", "127.0.0.1", required).await;
        assert_eq!(result.status, ProbeStatus::Inconclusive);
        assert!(result.message.contains("STARTTLS required"));
    }

    #[tokio::test]
    async fn unreachable_host_is_temporary_with_code_zero() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let result = prober(port).probe_mailbox("a@corp.com", "127.0.0.1", PLAIN).await;
        assert_eq!(result.status, ProbeStatus::TemporaryError);
        assert_eq!(result.code, 0);
    }

    /// Refuses `dead.test` and dials everything else directly.
    struct OneDeadHost;

    impl Dialer for OneDeadHost {
        fn dial<'a>(
            &'a self,
            host: &'a str,
            port: u16,
            timeout: Duration,
            gate: &'a RateGate,
        ) -> futures::future::BoxFuture<'a, std::result::Result<DialedStream, ProbeError>> {
            if host == "dead.test" {
                return Box::pin(async move {
                    Err(ProbeError::Connect {
                        host: host.to_string(),
                        port,
                        reason: "refused".into(),
                    })
                });
            }
            static DIRECT: DirectDialer = DirectDialer;
            DIRECT.dial(host, port, timeout, gate)
        }
    }

    #[tokio::test]
    async fn walks_mx_hosts_until_one_answers() {
        let server = mock::start(|_| "250 OK".to_string()).await;
        let config = Config {
            smtp_ports: vec![server.port],
            smtp_rate_limit_interval: Duration::ZERO,
            ..Config::default()
        };
        let prober = MailboxProber::new(&config, Arc::new(OneDeadHost)).unwrap();
        let hosts = vec!["dead.test".to_string(), "127.0.0.1".to_string()];
        let result = prober.probe_hosts("a@corp.com", &hosts, PLAIN).await;
        assert_eq!(result.status, ProbeStatus::Accepted);
        assert_eq!(result.mx_host, "127.0.0.1");
    }

    #[tokio::test]
    async fn queued_mailbox_checks_hold_no_connections() {
        let server = mock::start(|_| "250 OK".to_string()).await;
        let config = Config {
            smtp_enabled: true,
            smtp_ports: vec![server.port],
            smtp_timeout: Duration::from_secs(5),
            smtp_rate_limit_interval: Duration::from_secs(3),
            ..Config::default()
        };
        let checker = Arc::new(MailboxProber::new(&config, Arc::new(DirectDialer)).unwrap());

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let checker = checker.clone();
                tokio::spawn(async move {
                    let email = format!("user{}@corp.com", i);
                    checker.probe_mailbox(&email, "127.0.0.1", PLAIN).await
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(server.sessions(), 1);

        for handle in handles {
            handle.abort();
        }
    }
}
