//! Engine configuration via `trellis.toml`
//!
//! On first start a default `trellis.toml` can be written next to the site's
//! data. To change settings, edit the file and restart.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trellis_core::{Error, Result};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "trellis.toml";

/// The site records are addressed under
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteConfig {
    /// Public host, e.g. `example.com`
    #[serde(default = "default_host")]
    pub host: String,
    /// Path below the host, e.g. `/blog` (empty for the root)
    #[serde(default)]
    pub path: String,
    /// Address prefix; defaults to `host` + `path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Protocol for public URLs
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_protocol() -> String {
    "http".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            path: String::new(),
            prefix: None,
            protocol: default_protocol(),
        }
    }
}

impl SiteConfig {
    /// A site at `host` with no path
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// The address prefix records live under
    pub fn prefix(&self) -> String {
        match &self.prefix {
            Some(prefix) => prefix.clone(),
            None => format!("{}{}", self.host, self.path),
        }
    }

    /// Public base URL, e.g. `http://example.com/blog`
    pub fn base_url(&self) -> String {
        format!("{}://{}{}", self.protocol, self.host, self.path)
    }
}

/// Engine configuration loaded from `trellis.toml`.
///
/// # Example
///
/// ```toml
/// timeout_base_ms = 4000
/// publish_multiplier = 5
/// put_multiplier = 5
/// get_multiplier = 2
/// scheduler_interval_ms = 30000
///
/// [site]
/// host = "example.com"
/// path = "/blog"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base timeout every budget is a multiple of, in milliseconds
    #[serde(default = "default_timeout_base_ms")]
    pub timeout_base_ms: u64,
    /// Publish budget multiplier
    #[serde(default = "default_publish_multiplier")]
    pub publish_multiplier: u32,
    /// Save budget multiplier
    #[serde(default = "default_put_multiplier")]
    pub put_multiplier: u32,
    /// Get/render budget multiplier
    #[serde(default = "default_get_multiplier")]
    pub get_multiplier: u32,
    /// How often the scheduler scans for due publishes, in milliseconds
    #[serde(default = "default_scheduler_interval_ms")]
    pub scheduler_interval_ms: u64,
    /// The site records are addressed under
    #[serde(default)]
    pub site: SiteConfig,
}

fn default_timeout_base_ms() -> u64 {
    4000
}

fn default_publish_multiplier() -> u32 {
    5
}

fn default_put_multiplier() -> u32 {
    5
}

fn default_get_multiplier() -> u32 {
    2
}

fn default_scheduler_interval_ms() -> u64 {
    30_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_base_ms: default_timeout_base_ms(),
            publish_multiplier: default_publish_multiplier(),
            put_multiplier: default_put_multiplier(),
            get_multiplier: default_get_multiplier(),
            scheduler_interval_ms: default_scheduler_interval_ms(),
            site: SiteConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Budget for a whole publish
    pub fn publish_budget(&self) -> Duration {
        Duration::from_millis(self.timeout_base_ms * u64::from(self.publish_multiplier))
    }

    /// Budget for a save, hooks and commit included
    pub fn put_budget(&self) -> Duration {
        Duration::from_millis(self.timeout_base_ms * u64::from(self.put_multiplier))
    }

    /// Budget for a single get/render
    pub fn get_budget(&self) -> Duration {
        Duration::from_millis(self.timeout_base_ms * u64::from(self.get_multiplier))
    }

    /// Scheduler scan interval
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms)
    }

    /// Check that every budget is usable
    ///
    /// # Errors
    ///
    /// Returns a configuration error for zero budgets or an empty host.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_base_ms == 0 {
            return Err(Error::config("timeout_base_ms must be greater than zero"));
        }
        if self.publish_multiplier == 0 || self.put_multiplier == 0 || self.get_multiplier == 0 {
            return Err(Error::config("timeout multipliers must be greater than zero"));
        }
        if self.scheduler_interval_ms == 0 {
            return Err(Error::config("scheduler_interval_ms must be greater than zero"));
        }
        if self.site.host.is_empty() {
            return Err(Error::config("site.host must not be empty"));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Trellis engine configuration
#
# Every operation budget is a multiple of this base, in milliseconds.
timeout_base_ms = 4000

# Publish budget = timeout_base_ms * publish_multiplier
publish_multiplier = 5

# Save budget = timeout_base_ms * put_multiplier
put_multiplier = 5

# Get/render budget = timeout_base_ms * get_multiplier
get_multiplier = 2

# How often the scheduler looks for due publishes, in milliseconds.
scheduler_interval_ms = 30000

[site]
host = "localhost"
# path = "/blog"
# prefix = "localhost"   # defaults to host + path
protocol = "http"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
