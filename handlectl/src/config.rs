//! CLI configuration management
//!
//! Settings come from, lowest to highest priority: built-in defaults, the
//! config file, `HANDLECTL_*` environment variables, and command-line
//! arguments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_SERVER: &str = "HANDLECTL_SERVER";
pub const ENV_PREFIX: &str = "HANDLECTL_PREFIX";
pub const ENV_INDEX: &str = "HANDLECTL_INDEX";
pub const ENV_TIMEOUT: &str = "HANDLECTL_TIMEOUT";
pub const ENV_THROTTLE: &str = "HANDLECTL_THROTTLE";
pub const ENV_PAGE_SIZE: &str = "HANDLECTL_PAGE_SIZE";

/// Largest page the server should be asked for
pub const MAX_PAGE_SIZE: u64 = 10_000;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CliConfig {
    /// Base PID server URL; `/api/...` is appended
    pub server_url: String,

    /// Handle prefix, like `21.12102`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// User index, like `312`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Seconds between requests
    pub throttle: f64,

    /// Page size when downloading
    pub page_size: u64,

    /// Rows to process or pages to download
    pub count: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: "https://epic-pid.storage.surfsara.nl:8001".to_string(),
            prefix: None,
            index: None,
            // Listing a page of a large prefix takes about 30 seconds
            timeout: 300,
            throttle: 10.0,
            page_size: MAX_PAGE_SIZE,
            count: 3,
        }
    }
}

impl CliConfig {
    /// Load configuration from `path`; `Ok(None)` if the file does not exist
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&content)
            .map(Some)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize CLI config")?;

        std::fs::write(path, content).context("Failed to write CLI config file")?;

        Ok(())
    }

    /// Default configuration file path, `<config dir>/handlectl/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("handlectl").join("config.toml"))
            .ok_or_else(|| anyhow::anyhow!("Cannot determine config directory"))
    }
}

/// Builder for CLI configuration with validation and priority chain support
///
/// File and environment values only fill settings that are still unset, so
/// apply them from highest to lowest priority; the `with_*` setters always
/// override.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    server_url: Option<String>,
    prefix: Option<String>,
    index: Option<String>,
    timeout: Option<u64>,
    throttle: Option<f64>,
    page_size: Option<u64>,
    count: Option<u64>,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set server URL (with validation)
    pub fn with_server_url(mut self, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        Self::validate_url(&url)?;
        self.server_url = Some(url);
        Ok(self)
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        Self::validate_prefix(&prefix)?;
        self.prefix = Some(prefix);
        Ok(self)
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Result<Self> {
        let index = index.into();
        Self::validate_index(&index)?;
        self.index = Some(index);
        Ok(self)
    }

    /// Set timeout (with validation)
    pub fn with_timeout(mut self, timeout: u64) -> Result<Self> {
        Self::validate_timeout(timeout)?;
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// Set throttle in seconds (with validation)
    pub fn with_throttle(mut self, throttle: f64) -> Result<Self> {
        Self::validate_throttle(throttle)?;
        self.throttle = Some(throttle);
        Ok(self)
    }

    /// Set page size (with validation)
    pub fn with_page_size(mut self, page_size: u64) -> Result<Self> {
        Self::validate_page_size(page_size)?;
        self.page_size = Some(page_size);
        Ok(self)
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Fill unset values from the config file at `path`, if it exists
    pub fn with_config_file(self, path: &Path) -> Result<Self> {
        let Some(config) = CliConfig::load_from(path)? else {
            return Ok(self);
        };

        Ok(Self {
            server_url: self.server_url.or(Some(config.server_url)),
            prefix: self.prefix.or(config.prefix),
            index: self.index.or(config.index),
            timeout: self.timeout.or(Some(config.timeout)),
            throttle: self.throttle.or(Some(config.throttle)),
            page_size: self.page_size.or(Some(config.page_size)),
            count: self.count.or(Some(config.count)),
        })
    }

    /// Fill unset values from `HANDLECTL_*` environment variables.
    ///
    /// Invalid values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if self.server_url.is_none() {
            if let Ok(server_url) = std::env::var(ENV_SERVER) {
                if Self::validate_url(&server_url).is_ok() {
                    self.server_url = Some(server_url);
                }
            }
        }

        if self.prefix.is_none() {
            if let Ok(prefix) = std::env::var(ENV_PREFIX) {
                if Self::validate_prefix(&prefix).is_ok() {
                    self.prefix = Some(prefix);
                }
            }
        }

        if self.index.is_none() {
            if let Ok(index) = std::env::var(ENV_INDEX) {
                if Self::validate_index(&index).is_ok() {
                    self.index = Some(index);
                }
            }
        }

        if self.timeout.is_none() {
            if let Ok(Ok(timeout)) = std::env::var(ENV_TIMEOUT).map(|t| t.parse()) {
                if Self::validate_timeout(timeout).is_ok() {
                    self.timeout = Some(timeout);
                }
            }
        }

        if self.throttle.is_none() {
            if let Ok(Ok(throttle)) = std::env::var(ENV_THROTTLE).map(|t| t.parse()) {
                if Self::validate_throttle(throttle).is_ok() {
                    self.throttle = Some(throttle);
                }
            }
        }

        if self.page_size.is_none() {
            if let Ok(Ok(page_size)) = std::env::var(ENV_PAGE_SIZE).map(|t| t.parse()) {
                if Self::validate_page_size(page_size).is_ok() {
                    self.page_size = Some(page_size);
                }
            }
        }

        self
    }

    /// Build the final configuration with validation
    pub fn build(self) -> Result<CliConfig> {
        let defaults = CliConfig::default();

        let server_url = self.server_url.unwrap_or(defaults.server_url);
        let timeout = self.timeout.unwrap_or(defaults.timeout);
        let throttle = self.throttle.unwrap_or(defaults.throttle);
        let page_size = self.page_size.unwrap_or(defaults.page_size);

        // Values from the config file bypass the setters
        Self::validate_url(&server_url)?;
        Self::validate_timeout(timeout)?;
        Self::validate_throttle(throttle)?;
        Self::validate_page_size(page_size)?;
        if let Some(prefix) = &self.prefix {
            Self::validate_prefix(prefix)?;
        }
        if let Some(index) = &self.index {
            Self::validate_index(index)?;
        }

        Ok(CliConfig {
            server_url,
            prefix: self.prefix,
            index: self.index,
            timeout,
            throttle,
            page_size,
            count: self.count.unwrap_or(defaults.count),
        })
    }

    /// Validate URL format
    fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(anyhow::anyhow!("Server URL cannot be empty"));
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "Server URL must start with http:// or https://"
            ));
        }

        Ok(())
    }

    fn validate_prefix(prefix: &str) -> Result<()> {
        if prefix.trim().is_empty() {
            return Err(anyhow::anyhow!("Prefix cannot be empty"));
        }
        if prefix.contains('/') {
            return Err(anyhow::anyhow!(
                "Prefix '{}' must not contain '/', give only the part before the slash",
                prefix
            ));
        }
        Ok(())
    }

    fn validate_index(index: &str) -> Result<()> {
        if index.trim().is_empty() {
            return Err(anyhow::anyhow!("User index cannot be empty"));
        }
        Ok(())
    }

    /// Validate timeout value
    fn validate_timeout(timeout: u64) -> Result<()> {
        if timeout == 0 {
            return Err(anyhow::anyhow!("Timeout must be greater than 0"));
        }

        if timeout > 3600 {
            return Err(anyhow::anyhow!(
                "Timeout must be less than or equal to 3600 seconds"
            ));
        }

        Ok(())
    }

    fn validate_throttle(throttle: f64) -> Result<()> {
        if !throttle.is_finite() || throttle < 0.0 {
            return Err(anyhow::anyhow!(
                "Throttle must be a non-negative number of seconds"
            ));
        }
        Ok(())
    }

    fn validate_page_size(page_size: u64) -> Result<()> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(anyhow::anyhow!(
                "Page size must be between 1 and {}",
                MAX_PAGE_SIZE
            ));
        }
        Ok(())
    }
}
