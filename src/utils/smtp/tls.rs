//! STARTTLS client configuration.

use rustls::{ClientConfig, RootCertStore, ServerName};
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// Builds a connector trusting the platform's root certificates.
///
/// A platform store that cannot be read leaves the root set empty; STARTTLS
/// handshakes then fail and the prober falls back to plaintext.
pub fn build_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let der: Vec<Vec<u8>> = certs.into_iter().map(|c| c.0).collect();
            let (added, ignored) = roots.add_parsable_certificates(&der);
            tracing::debug!(target: "smtp_task", "Loaded {} native root certificates ({} ignored)", added, ignored);
        }
        Err(e) => {
            tracing::warn!(target: "smtp_task", "Could not load native root certificates: {}", e);
        }
    }

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

pub fn server_name(host: &str) -> Result<ServerName, String> {
    ServerName::try_from(host).map_err(|e| format!("invalid TLS server name '{}': {}", host, e))
}
