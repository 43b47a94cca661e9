//! Layers configuration sources on top of [`Config::default`].
//!
//! Order of precedence, lowest first: built-in defaults, the TOML file, then
//! explicit overrides (usually from the command line).

use super::file::ConfigFile;
use super::{validation, Config};
use crate::core::error::{AppError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

fn secs_f32(field: &str, value: f32) -> Result<Duration> {
    Duration::try_from_secs_f32(value)
        .map_err(|_| AppError::Config(format!("{} must be a non-negative number of seconds", field)))
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies every value present in `file`; absent values keep their defaults.
    pub fn with_file(mut self, file: &ConfigFile, path: Option<&Path>) -> Result<Self> {
        let c = &mut self.config;

        let v = &file.validation;
        if let Some(x) = v.allow_smtputf8 {
            c.allow_smtputf8 = x;
        }
        if let Some(x) = v.allow_empty_local {
            c.allow_empty_local = x;
        }
        if let Some(x) = v.allow_quoted_local {
            c.allow_quoted_local = x;
        }
        if let Some(x) = v.allow_domain_literal {
            c.allow_domain_literal = x;
        }
        if let Some(x) = &v.allowed_special_domains {
            c.allowed_special_domains = x.iter().map(|d| d.trim().to_lowercase()).collect();
        }
        if let Some(x) = v.allow_plus_addressing {
            c.allow_plus_addressing = x;
        }
        if let Some(x) = &v.no_plus_domains {
            c.no_plus_domains = x.iter().map(|d| d.trim().to_lowercase()).collect();
        }
        if let Some(x) = v.enforce_digit_ratio {
            c.enforce_digit_ratio = x;
        }

        let d = &file.dns;
        if let Some(x) = &d.dns_servers {
            c.dns_servers = x.clone();
        }
        if let Some(x) = d.dns_timeout {
            c.dns_timeout = Duration::from_secs(x);
        }
        if let Some(x) = d.dns_max_retries {
            c.dns_max_retries = x;
        }
        if let Some(x) = d.dns_retry_delay {
            c.dns_retry_delay = secs_f32("dns.dns_retry_delay", x)?;
        }
        if let Some(x) = d.dns_cache_max_size {
            c.dns_cache_max_size = x;
        }

        let s = &file.smtp;
        if let Some(x) = s.smtp_enabled {
            c.smtp_enabled = x;
        }
        if let Some(x) = &s.smtp_ports {
            c.smtp_ports = x.clone();
        }
        if let Some(x) = s.smtp_timeout {
            c.smtp_timeout = Duration::from_secs(x);
        }
        if let Some(x) = &s.smtp_sender_email {
            c.smtp_sender_email = x.clone();
        }
        if let Some(x) = &s.smtp_helo_name {
            c.smtp_helo_name = x.clone();
        }
        if let Some(x) = s.smtp_max_retries {
            c.smtp_max_retries = x;
        }
        if let Some(x) = s.smtp_retry_delay {
            c.smtp_retry_delay = secs_f32("smtp.smtp_retry_delay", x)?;
        }
        if let Some(x) = s.smtp_rate_limit_interval {
            c.smtp_rate_limit_interval = secs_f32("smtp.smtp_rate_limit_interval", x)?;
        }
        if let Some(x) = s.smtp_max_mx_hosts {
            c.smtp_max_mx_hosts = x;
        }
        if let Some(x) = s.catchall_check_enabled {
            c.catchall_check_enabled = x;
        }
        if let Some(x) = s.catchall_probe_count {
            c.catchall_probe_count = x;
        }
        if let Some(x) = s.catchall_cache_max_size {
            c.catchall_cache_max_size = x;
        }

        if let Some(x) = file.concurrency.global_timeout_seconds {
            c.global_timeout = Duration::from_secs(x);
        }
        if let Some(x) = file.concurrency.max_workers {
            c.max_workers = x;
        }

        if let Some(x) = &file.proxy.proxy_list {
            c.proxy_list = x.clone();
        }

        let p = &file.paths;
        if let Some(x) = &p.disposable_domains {
            c.disposable_domains_path = Some(x.clone());
        }
        if let Some(x) = &p.tld_list {
            c.tld_list_path = Some(x.clone());
        }
        if let Some(x) = &p.well_known_domains {
            c.well_known_domains_path = Some(x.clone());
        }
        if let Some(x) = &p.output_dir {
            c.output_dir = x.clone();
        }

        c.loaded_config_path = path.map(|p| p.display().to_string());
        Ok(self)
    }

    pub fn smtp_enabled(mut self, enabled: bool) -> Self {
        self.config.smtp_enabled = enabled;
        self
    }

    pub fn catchall_check_enabled(mut self, enabled: bool) -> Self {
        self.config.catchall_check_enabled = enabled;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = workers;
        self
    }

    pub fn global_timeout(mut self, timeout: Duration) -> Self {
        self.config.global_timeout = timeout;
        self
    }

    pub fn dns_servers(mut self, servers: Vec<String>) -> Self {
        self.config.dns_servers = servers;
        self
    }

    pub fn proxy_list(mut self, proxies: Vec<String>) -> Self {
        self.config.proxy_list = proxies;
        self
    }

    pub fn disposable_domains_path(mut self, path: PathBuf) -> Self {
        self.config.disposable_domains_path = Some(path);
        self
    }

    pub fn tld_list_path(mut self, path: PathBuf) -> Self {
        self.config.tld_list_path = Some(path);
        self
    }

    pub fn well_known_domains_path(mut self, path: PathBuf) -> Self {
        self.config.well_known_domains_path = Some(path);
        self
    }

    pub fn output_dir(mut self, path: PathBuf) -> Self {
        self.config.output_dir = path;
        self
    }

    /// Validates and returns the finished configuration.
    pub fn build(self) -> Result<Config> {
        validation::validate(&self.config)?;
        Ok(self.config)
    }
}
