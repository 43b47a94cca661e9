//! Defines the structure mirroring the TOML configuration file format.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub(crate) validation: ValidationConfig,
    #[serde(default)]
    pub(crate) dns: DnsConfig,
    #[serde(default)]
    pub(crate) smtp: SmtpConfig,
    #[serde(default)]
    pub(crate) concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub(crate) proxy: ProxyConfig,
    #[serde(default)]
    pub(crate) paths: PathsConfig,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct ValidationConfig {
    pub(crate) allow_smtputf8: Option<bool>,
    pub(crate) allow_empty_local: Option<bool>,
    pub(crate) allow_quoted_local: Option<bool>,
    pub(crate) allow_domain_literal: Option<bool>,
    pub(crate) allowed_special_domains: Option<Vec<String>>,
    pub(crate) allow_plus_addressing: Option<bool>,
    pub(crate) no_plus_domains: Option<Vec<String>>,
    pub(crate) enforce_digit_ratio: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct DnsConfig {
    pub(crate) dns_servers: Option<Vec<String>>,
    /// Seconds.
    pub(crate) dns_timeout: Option<u64>,
    pub(crate) dns_max_retries: Option<u32>,
    /// Seconds, fractional values allowed.
    pub(crate) dns_retry_delay: Option<f32>,
    pub(crate) dns_cache_max_size: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct SmtpConfig {
    pub(crate) smtp_enabled: Option<bool>,
    pub(crate) smtp_ports: Option<Vec<u16>>,
    pub(crate) smtp_timeout: Option<u64>,
    pub(crate) smtp_sender_email: Option<String>,
    pub(crate) smtp_helo_name: Option<String>,
    pub(crate) smtp_max_retries: Option<u32>,
    pub(crate) smtp_retry_delay: Option<f32>,
    pub(crate) smtp_rate_limit_interval: Option<f32>,
    pub(crate) smtp_max_mx_hosts: Option<usize>,
    pub(crate) catchall_check_enabled: Option<bool>,
    pub(crate) catchall_probe_count: Option<usize>,
    pub(crate) catchall_cache_max_size: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConcurrencyConfig {
    pub(crate) global_timeout_seconds: Option<u64>,
    pub(crate) max_workers: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct ProxyConfig {
    pub(crate) proxy_list: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct PathsConfig {
    pub(crate) disposable_domains: Option<PathBuf>,
    pub(crate) tld_list: Option<PathBuf>,
    pub(crate) well_known_domains: Option<PathBuf>,
    pub(crate) output_dir: Option<PathBuf>,
}
