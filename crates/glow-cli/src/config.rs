//! Configuration file handling

use anyhow::{Context, Result};
use glob_match::glob_match;
use glow_client::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub scan: ScanSection,
    pub session: ClientConfig,
    pub filter: DeviceFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanSection {
    /// Scan duration in seconds
    pub seconds: u64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self { seconds: 10 }
    }
}

/// Glob patterns selecting which light to talk to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceFilter {
    pub name: Option<String>,
    pub address: Option<String>,
}

impl DeviceFilter {
    /// Every configured pattern must match. A name pattern never matches an
    /// unnamed device.
    pub fn matches(&self, name: Option<&str>, address: &str) -> bool {
        let name_ok = match (&self.name, name) {
            (Some(pattern), Some(name)) => glob_match(pattern, name),
            (Some(_), None) => false,
            (None, _) => true,
        };
        let address_ok = self
            .address
            .as_deref()
            .map_or(true, |pattern| glob_match(&pattern.to_uppercase(), &address.to_uppercase()));

        name_ok && address_ok
    }
}

/// Default location: `<config dir>/glow/config.toml`
pub fn default_config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("glow")
        .join("config.toml")
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration")
    }

    /// Load `path`, or the default file if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_file(), false),
        };

        if !required && !path.exists() {
            debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config =
            Self::parse(&text).with_context(|| format!("In config file {}", path.display()))?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}
