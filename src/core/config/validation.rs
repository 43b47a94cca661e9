//! Sanity checks applied to a fully built [`Config`].

use super::Config;
use crate::core::error::{AppError, Result};
use crate::utils::dns::transport::parse_server_addr;
use crate::utils::smtp::proxy::ProxyEndpoint;
use lettre::Address;
use std::str::FromStr;

pub(crate) fn validate(config: &Config) -> Result<()> {
    if config.max_workers == 0 {
        return Err(AppError::Config("max_workers must be at least 1".into()));
    }
    if config.global_timeout.is_zero() {
        return Err(AppError::Config(
            "global_timeout_seconds must be greater than zero".into(),
        ));
    }
    if config.dns_servers.is_empty() {
        return Err(AppError::Config("dns_servers must not be empty".into()));
    }
    for server in &config.dns_servers {
        parse_server_addr(server).map_err(|e| {
            AppError::Config(format!("Invalid DNS server '{}': {}", server, e))
        })?;
    }
    if config.dns_timeout.is_zero() {
        return Err(AppError::Config("dns_timeout must be greater than zero".into()));
    }
    if config.dns_cache_max_size == 0 {
        return Err(AppError::Config("dns_cache_max_size must be at least 1".into()));
    }

    if config.smtp_enabled {
        if config.smtp_ports.is_empty() || config.smtp_ports.contains(&0) {
            return Err(AppError::Config(
                "smtp_ports must list at least one non-zero port".into(),
            ));
        }
        Address::from_str(&config.smtp_sender_email).map_err(|e| {
            AppError::Config(format!(
                "Invalid smtp_sender_email '{}': {}",
                config.smtp_sender_email, e
            ))
        })?;
        if config.smtp_helo_name.trim().is_empty() {
            return Err(AppError::Config("smtp_helo_name must not be empty".into()));
        }
        if config.smtp_max_mx_hosts == 0 {
            return Err(AppError::Config("smtp_max_mx_hosts must be at least 1".into()));
        }
        if config.catchall_check_enabled && config.catchall_probe_count == 0 {
            return Err(AppError::Config(
                "catchall_probe_count must be at least 1 when catch-all checks are enabled"
                    .into(),
            ));
        }
    }

    for entry in &config.proxy_list {
        ProxyEndpoint::parse(entry).map_err(|reason| {
            AppError::Config(format!("Invalid proxy entry '{}': {}", entry, reason))
        })?;
    }

    if config.global_timeout < config.dns_timeout {
        tracing::warn!(
            "global timeout {:?} is shorter than a single DNS query timeout {:?}",
            config.global_timeout,
            config.dns_timeout
        );
    }

    Ok(())
}
