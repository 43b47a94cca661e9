//! Scriptable loopback SMTP server for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

type RcptRule = dyn Fn(&str) -> String + Send + Sync;

#[derive(Clone)]
pub(crate) struct MockSmtp {
    pub(crate) port: u16,
    pub(crate) sessions: Arc<AtomicUsize>,
    pub(crate) rcpts: Arc<AtomicUsize>,
    pub(crate) quits: Arc<AtomicUsize>,
}

impl MockSmtp {
    pub(crate) fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub(crate) fn rcpts(&self) -> usize {
        self.rcpts.load(Ordering::SeqCst)
    }

    pub(crate) fn quits(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }
}

/// Starts a server whose `RCPT TO` replies come from `rule(address)`.
pub(crate) async fn start<F>(rule: F) -> MockSmtp
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    start_with("250 2.1.0 Sender OK", rule).await
}

/// Like [`start`], with a fixed reply to `MAIL FROM`.
pub(crate) async fn start_with<F>(mail_reply: &'static str, rule: F) -> MockSmtp
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mock = MockSmtp {
        port,
        sessions: Arc::new(AtomicUsize::new(0)),
        rcpts: Arc::new(AtomicUsize::new(0)),
        quits: Arc::new(AtomicUsize::new(0)),
    };
    let rule: Arc<RcptRule> = Arc::new(rule);

    let counters = mock.clone();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            counters.sessions.fetch_add(1, Ordering::SeqCst);
            let rule = rule.clone();
            let counters = counters.clone();
            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();
                if write.write_all(b"220 mock.test ESMTP ready\r\n").await.is_err() {
                    return;
                }
                while let Ok(Some(line)) = lines.next_line().await {
                    let upper = line.to_ascii_uppercase();
                    let reply = if upper.starts_with("EHLO") {
                        "250-mock.test greets you\r\n250-SIZE 10240000\r\n250 8BITMIME\r\n".to_string()
                    } else if upper.starts_with("HELO") {
                        "250 mock.test\r\n".to_string()
                    } else if upper.starts_with("MAIL FROM") {
                        format!("{}\r\n", mail_reply)
                    } else if upper.starts_with("RCPT TO") {
                        counters.rcpts.fetch_add(1, Ordering::SeqCst);
                        let address = line
                            .split_once('<')
                            .and_then(|(_, rest)| rest.split_once('>'))
                            .map(|(addr, _)| addr.to_string())
                            .unwrap_or_default();
                        format!("{}\r\n", rule(&address))
                    } else if upper.starts_with("RSET") {
                        "250 2.0.0 Reset\r\n".to_string()
                    } else if upper.starts_with("QUIT") {
                        counters.quits.fetch_add(1, Ordering::SeqCst);
                        let _ = write.write_all(b"221 2.0.0 Bye\r\n").await;
                        break;
                    } else {
                        "502 5.5.2 Command not implemented\r\n".to_string()
                    };
                    if write.write_all(reply.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    mock
}

/// Sends every connection to the loopback interface, whatever the host.
pub(crate) struct LoopbackDialer;

impl super::proxy::Dialer for LoopbackDialer {
    fn dial<'a>(
        &'a self,
        _host: &'a str,
        port: u16,
        timeout: std::time::Duration,
        gate: &'a super::rate_limit::RateGate,
    ) -> futures::future::BoxFuture<'a, Result<super::proxy::DialedStream, super::error::ProbeError>> {
        static DIRECT: super::proxy::DirectDialer = super::proxy::DirectDialer;
        super::proxy::Dialer::dial(&DIRECT, "127.0.0.1", port, timeout, gate)
    }
}
