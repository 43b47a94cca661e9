//! A minimal async SMTP client session: reply parsing, command exchange and
//! in-place STARTTLS upgrade. Every read and write is bounded by the session
//! timeout.

use super::error::ProbeError;
use super::tls;
use lettre::transport::smtp::commands::Quit;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf,
};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

const MAX_REPLY_LINES: usize = 128;
const MAX_LINE_BYTES: u64 = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    /// Looks for an EHLO keyword such as `STARTTLS`.
    pub fn has_capability(&self, keyword: &str) -> bool {
        self.lines.iter().any(|line| {
            line.split_whitespace()
                .next()
                .map_or(false, |first| first.eq_ignore_ascii_case(keyword))
        })
    }
}

enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

pub struct SmtpSession {
    // `None` only while a STARTTLS upgrade is in progress or after it failed.
    stream: Option<BufReader<Transport>>,
    timeout: Duration,
    secure: bool,
}

impl SmtpSession {
    pub fn new(stream: TcpStream, timeout: Duration) -> Self {
        Self {
            stream: Some(BufReader::new(Transport::Plain(stream))),
            timeout,
            secure: false,
        }
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    fn stream(&mut self) -> Result<&mut BufReader<Transport>, ProbeError> {
        self.stream
            .as_mut()
            .ok_or_else(|| ProbeError::Protocol("session stream is gone after failed STARTTLS".into()))
    }

    /// Reads one (possibly multiline) reply.
    pub async fn read_reply(&mut self) -> Result<SmtpReply, ProbeError> {
        let timeout = self.timeout;
        let stream = self.stream()?;
        tokio::time::timeout(timeout, read_reply_from(stream))
            .await
            .map_err(|_| ProbeError::Timeout(timeout, "SMTP reply"))?
    }

    /// Sends one CRLF-terminated command line and reads its reply.
    pub async fn send(&mut self, line: &str) -> Result<SmtpReply, ProbeError> {
        let timeout = self.timeout;
        let stream = self.stream()?;
        tokio::time::timeout(timeout, async {
            let inner = stream.get_mut();
            inner.write_all(line.as_bytes()).await?;
            inner.flush().await?;
            Ok::<_, ProbeError>(())
        })
        .await
        .map_err(|_| ProbeError::Timeout(timeout, "SMTP write"))??;
        tracing::trace!(target: "smtp_task", "C: {}", line.trim_end());
        self.read_reply().await
    }

    /// Performs the TLS handshake after a positive `STARTTLS` reply.
    pub async fn upgrade(&mut self, connector: &TlsConnector, host: &str) -> Result<(), ProbeError> {
        let name = tls::server_name(host).map_err(ProbeError::Tls)?;
        let reader = self
            .stream
            .take()
            .ok_or_else(|| ProbeError::Protocol("session stream already consumed".into()))?;
        let Transport::Plain(tcp) = reader.into_inner() else {
            return Err(ProbeError::Protocol("session is already using TLS".into()));
        };
        let tls_stream = tokio::time::timeout(self.timeout, connector.connect(name, tcp))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout, "TLS handshake"))?
            .map_err(|e| ProbeError::Tls(e.to_string()))?;
        self.stream = Some(BufReader::new(Transport::Tls(Box::new(tls_stream))));
        self.secure = true;
        Ok(())
    }

    /// Best-effort `QUIT` followed by closing the socket.
    pub async fn close(mut self) {
        if self.stream.is_some() {
            if let Err(e) = self.send(&Quit.to_string()).await {
                tracing::trace!(target: "smtp_task", "QUIT failed: {}", e);
            }
        }
        if let Some(mut stream) = self.stream.take() {
            let _ = tokio::time::timeout(self.timeout, stream.get_mut().shutdown()).await;
        }
    }
}

async fn read_reply_from<R>(reader: &mut R) -> Result<SmtpReply, ProbeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let mut raw = String::new();
        let read = (&mut *reader).take(MAX_LINE_BYTES).read_line(&mut raw).await?;
        if read == 0 {
            return Err(ProbeError::Protocol("connection closed by server".into()));
        }
        if read as u64 >= MAX_LINE_BYTES && !raw.ends_with('\n') {
            return Err(ProbeError::Protocol(format!(
                "reply line longer than {} bytes",
                MAX_LINE_BYTES
            )));
        }
        let line = raw.trim_end_matches(['\r', '\n']);
        tracing::trace!(target: "smtp_task", "S: {}", line);

        let code = line
            .get(..3)
            .and_then(|c| c.parse::<u16>().ok())
            .filter(|c| (200..600).contains(c))
            .ok_or_else(|| ProbeError::Protocol(format!("unexpected line '{}'", line)))?;
        let more = line.as_bytes().get(3) == Some(&b'-');
        lines.push(line.get(4..).unwrap_or("").trim().to_string());

        if !more {
            return Ok(SmtpReply { code, lines });
        }
        if lines.len() >= MAX_REPLY_LINES {
            return Err(ProbeError::Protocol("reply has too many lines".into()));
        }
    }
}
