//! Locates and reads the TOML configuration file.

use super::file::ConfigFile;
use crate::core::error::{AppError, Result};
use std::fs;
use std::path::{Path, PathBuf};

const LOCAL_CONFIG_NAME: &str = "email-vetter.toml";

/// Candidate locations searched when no explicit path is given, in order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_NAME)];
    if let Ok(home) = std::env::var("HOME") {
        paths.push(
            PathBuf::from(home)
                .join(".config")
                .join("email-vetter")
                .join("config.toml"),
        );
    }
    paths
}

/// Reads the configuration file.
///
/// An explicit `path` must exist. Without one, the first existing default
/// location is used, and a missing file yields an empty [`ConfigFile`].
pub fn load_config_file(path: Option<&Path>) -> Result<(ConfigFile, Option<PathBuf>)> {
    let chosen = match path {
        Some(p) => {
            if !p.is_file() {
                return Err(AppError::Config(format!(
                    "Config file '{}' not found",
                    p.display()
                )));
            }
            Some(p.to_path_buf())
        }
        None => default_config_paths().into_iter().find(|p| p.is_file()),
    };

    let Some(chosen) = chosen else {
        tracing::debug!("No configuration file found, using defaults");
        return Ok((ConfigFile::default(), None));
    };

    tracing::info!("Loading configuration from {}", chosen.display());
    let content = fs::read_to_string(&chosen)?;
    let file: ConfigFile = toml::from_str(&content)?;
    Ok((file, Some(chosen)))
}
