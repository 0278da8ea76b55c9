use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::ClientSettings;
use crate::discovery::DiscoverOptions;

/// Crate configuration loaded from a TOML file.
///
/// Everything has a default, so an empty file (or no file at all) yields a
/// working setup; an embedding CLI only overrides what it needs.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// SMB client settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Share name exposed by microSD Management.
    #[serde(default = "default_share")]
    pub share: String,
    /// NBSS port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-operation socket timeout in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

/// Discovery settings.
#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Cache file location; absent disables the cache.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Bound on a whole discovery run in milliseconds.
    #[serde(default = "default_total_budget_ms")]
    pub total_budget_ms: u64,
    /// Whether discovery failures should fall back to prompting.
    #[serde(default = "default_true")]
    pub allow_interactive: bool,
}

fn default_share() -> String {
    crate::client::DEFAULT_SHARE.to_string()
}

fn default_port() -> u16 {
    crate::client::DEFAULT_PORT
}

fn default_io_timeout_ms() -> u64 {
    crate::client::DEFAULT_IO_TIMEOUT.as_millis() as u64
}

fn default_total_budget_ms() -> u64 {
    crate::discovery::TOTAL_BUDGET.as_millis() as u64
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            share: default_share(),
            port: default_port(),
            io_timeout_ms: default_io_timeout_ms(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            cache_path: None,
            total_budget_ms: default_total_budget_ms(),
            allow_interactive: true,
        }
    }
}

impl Config {
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            share: self.client.share.clone(),
            port: self.client.port,
            io_timeout: Duration::from_millis(self.client.io_timeout_ms),
        }
    }

    pub fn discover_options(&self) -> DiscoverOptions {
        DiscoverOptions {
            cache_path: self.discovery.cache_path.clone(),
            total_budget: Duration::from_millis(self.discovery.total_budget_ms),
            allow_interactive: self.discovery.allow_interactive,
            nbss_port: self.client.port,
        }
    }
}

/// Load and parse the TOML configuration file.
pub fn load_config(path: &str) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path, e))?;
    if config.client.share.is_empty() {
        anyhow::bail!("client.share must not be empty");
    }
    if config.discovery.total_budget_ms == 0 {
        anyhow::bail!("discovery.total_budget_ms must be positive");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
            [client]
            share = "microSD"
            port = 1139
            io_timeout_ms = 5000
            [discovery]
            cache_path = "/tmp/n3ds-cache"
            total_budget_ms = 2000
            allow_interactive = false
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.client.port, 1139);
        assert_eq!(config.client.share, "microSD");
        assert!(!config.discovery.allow_interactive);

        let settings = config.client_settings();
        assert_eq!(settings.io_timeout, Duration::from_millis(5000));

        let options = config.discover_options();
        assert_eq!(options.nbss_port, 1139);
        assert_eq!(options.total_budget, Duration::from_millis(2000));
        assert_eq!(
            options.cache_path.as_deref(),
            Some(std::path::Path::new("/tmp/n3ds-cache"))
        );
    }

    #[test]
    fn test_empty_config_gets_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.client.share, crate::client::DEFAULT_SHARE);
        assert_eq!(config.client.port, crate::client::DEFAULT_PORT);
        assert!(config.discovery.cache_path.is_none());
        assert!(config.discovery.allow_interactive);
    }
}
