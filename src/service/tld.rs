//! Top-level domain list: from a local file, or freshly downloaded from IANA.

use super::lists::parse_domain_list;
use email_vetter_core::{AppError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const IANA_TLD_URL: &str = "https://data.iana.org/TLD/tlds-alpha-by-domain.txt";

/// The `# Version ...` header line of an IANA list, if present.
pub fn list_version(content: &str) -> Option<String> {
    content
        .lines()
        .next()
        .and_then(|line| line.strip_prefix('#'))
        .map(|v| v.trim().to_string())
        .filter(|v| v.to_ascii_lowercase().starts_with("version"))
}

pub async fn download_tld_list(url: &str, timeout: Duration) -> Result<(HashSet<String>, Option<String>)> {
    tracing::info!("Downloading TLD list from {}", url);
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("email-vetter/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let content = client.get(url).send().await?.error_for_status()?.text().await?;
    let tlds = parse_domain_list(&content);
    if tlds.is_empty() {
        return Err(AppError::Initialization(format!("TLD list from {} is empty", url)));
    }
    Ok((tlds, list_version(&content)))
}

/// Uses `path` when given; otherwise downloads from IANA unless `offline`.
/// A failed download leaves the set empty, which turns TLD membership
/// checks off.
pub async fn load_tlds(path: Option<&Path>, offline: bool) -> Result<HashSet<String>> {
    if let Some(path) = path {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Initialization(format!("Cannot read TLD list '{}': {}", path.display(), e))
        })?;
        let tlds = parse_domain_list(&content);
        tracing::info!(
            "Loaded {} TLDs from {} ({})",
            tlds.len(),
            path.display(),
            list_version(&content).unwrap_or_else(|| "unversioned".into())
        );
        return Ok(tlds);
    }
    if offline {
        tracing::warn!("No TLD list and downloads disabled; TLD membership will not be checked");
        return Ok(HashSet::new());
    }
    match download_tld_list(IANA_TLD_URL, Duration::from_secs(10)).await {
        Ok((tlds, version)) => {
            tracing::info!("Downloaded {} TLDs ({})", tlds.len(), version.unwrap_or_default());
            Ok(tlds)
        }
        Err(e) => {
            tracing::warn!("TLD download failed: {}; TLD membership will not be checked", e);
            Ok(HashSet::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Version 2024061000, Last Updated Mon Jun 10 07:07:01 2024 UTC\nAAA\nCOM\nXN--P1AI\n";

    #[test]
    fn parses_iana_format() {
        let tlds = parse_domain_list(SAMPLE);
        assert_eq!(tlds.len(), 3);
        assert!(tlds.contains("com"));
        assert!(tlds.contains("xn--p1ai"));
        assert_eq!(
            list_version(SAMPLE).as_deref(),
            Some("Version 2024061000, Last Updated Mon Jun 10 07:07:01 2024 UTC")
        );
        assert_eq!(list_version("COM\n"), None);
    }

    #[tokio::test]
    async fn offline_without_file_disables_check() {
        assert!(load_tlds(None, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_file_is_preferred() {
        let path = std::env::temp_dir().join(format!("email-vetter-tlds-{}.txt", std::process::id()));
        fs::write(&path, SAMPLE).unwrap();
        let tlds = load_tlds(Some(&path), false).await.unwrap();
        assert!(tlds.contains("aaa"));
        fs::remove_file(&path).ok();
    }
}
