//! Defines the core runtime `Config` struct, its defaults, and related utilities.
//! Submodules handle loading, building, and validation.

pub(crate) mod builder;
pub(crate) mod file;
pub(crate) mod loading;
pub(crate) mod validation;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;
pub use loading::{default_config_paths, load_config_file};

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration settings used by the email-vetter core logic.
#[derive(Clone)]
pub struct Config {
    pub allow_smtputf8: bool,
    pub allow_empty_local: bool,
    pub allow_quoted_local: bool,
    pub allow_domain_literal: bool,
    pub allowed_special_domains: Vec<String>,
    pub allow_plus_addressing: bool,
    pub no_plus_domains: Vec<String>,
    pub enforce_digit_ratio: bool,

    pub dns_servers: Vec<String>,
    pub dns_timeout: Duration,
    pub dns_max_retries: u32,
    pub dns_retry_delay: Duration,
    pub dns_cache_max_size: usize,

    pub smtp_enabled: bool,
    pub smtp_ports: Vec<u16>,
    pub smtp_timeout: Duration,
    pub smtp_sender_email: String,
    pub smtp_helo_name: String,
    pub smtp_max_retries: u32,
    pub smtp_retry_delay: Duration,
    pub smtp_rate_limit_interval: Duration,
    pub smtp_max_mx_hosts: usize,

    pub catchall_check_enabled: bool,
    pub catchall_probe_count: usize,
    pub catchall_cache_max_size: usize,

    pub global_timeout: Duration,
    pub max_workers: usize,

    pub proxy_list: Vec<String>,

    pub disposable_domains_path: Option<PathBuf>,
    pub tld_list_path: Option<PathBuf>,
    pub well_known_domains_path: Option<PathBuf>,
    pub output_dir: PathBuf,

    pub loaded_config_path: Option<String>,
}

impl Config {
    fn build_default() -> Self {
        let dns_servers = vec![
            "8.8.8.8".to_string(),
            "1.1.1.1".to_string(),
            "208.67.222.222".to_string(),
        ];
        let no_plus_domains = ["gmail.com", "googlemail.com", "google.com"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        Config {
            allow_smtputf8: false,
            allow_empty_local: false,
            allow_quoted_local: false,
            allow_domain_literal: false,
            allowed_special_domains: Vec::new(),
            allow_plus_addressing: false,
            no_plus_domains,
            enforce_digit_ratio: true,
            dns_servers,
            dns_timeout: Duration::from_secs(5),
            dns_max_retries: 3,
            dns_retry_delay: Duration::from_millis(500),
            dns_cache_max_size: 10_000,
            smtp_enabled: false,
            smtp_ports: vec![25, 587],
            smtp_timeout: Duration::from_secs(8),
            smtp_sender_email: "verify-probe@example.com".to_string(),
            smtp_helo_name: "localhost".to_string(),
            smtp_max_retries: 2,
            smtp_retry_delay: Duration::from_secs(1),
            smtp_rate_limit_interval: Duration::from_secs(1),
            smtp_max_mx_hosts: 2,
            catchall_check_enabled: true,
            catchall_probe_count: 1,
            catchall_cache_max_size: 10_000,
            global_timeout: Duration::from_secs(30),
            max_workers: 1000,
            proxy_list: Vec::new(),
            disposable_domains_path: None,
            tld_list_path: None,
            well_known_domains_path: None,
            output_dir: PathBuf::from("output"),
            loaded_config_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::build_default()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("allow_smtputf8", &self.allow_smtputf8)
            .field("allow_empty_local", &self.allow_empty_local)
            .field("allow_quoted_local", &self.allow_quoted_local)
            .field("allow_domain_literal", &self.allow_domain_literal)
            .field("allowed_special_domains", &self.allowed_special_domains)
            .field("allow_plus_addressing", &self.allow_plus_addressing)
            .field("no_plus_domains", &self.no_plus_domains)
            .field("enforce_digit_ratio", &self.enforce_digit_ratio)
            .field("dns_servers", &self.dns_servers)
            .field("dns_timeout", &self.dns_timeout)
            .field("dns_max_retries", &self.dns_max_retries)
            .field("dns_retry_delay", &self.dns_retry_delay)
            .field("dns_cache_max_size", &self.dns_cache_max_size)
            .field("smtp_enabled", &self.smtp_enabled)
            .field("smtp_ports", &self.smtp_ports)
            .field("smtp_timeout", &self.smtp_timeout)
            .field("smtp_sender_email", &self.smtp_sender_email)
            .field("smtp_max_retries", &self.smtp_max_retries)
            .field("catchall_check_enabled", &self.catchall_check_enabled)
            .field("global_timeout", &self.global_timeout)
            .field("max_workers", &self.max_workers)
            // Entries may embed proxy credentials.
            .field("proxy_count", &self.proxy_list.len())
            .field("output_dir", &self.output_dir)
            .field("loaded_config_path", &self.loaded_config_path)
            .finish()
    }
}

/// Delay before retry number `attempt` (zero-based): `base * (attempt + 1)`.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt.saturating_add(1))
}
