use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use visitrack::daemon::{Cutoff, TickConfig, TriggerPolicy};
use visitrack::domain::Category;
use visitrack::gps::{MAX_CACHED_AGE, MIN_TIMEOUT};
use visitrack::store::RestConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub auto_checkout: AutoCheckoutConfig,
    pub gps: GpsConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCheckoutConfig {
    pub enabled: bool,
    /// Daily cutoff, `HH:MM` 24h local time
    pub cutoff: String,
    pub target_category: Category,
    pub tick_interval_secs: u64,
    pub trigger: TriggerPolicy,
    pub stamp_manual_runs: bool,
}

impl Default for AutoCheckoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cutoff: "01:00".to_string(),
            target_category: Category::Factory,
            tick_interval_secs: 60,
            trigger: TriggerPolicy::ExactMinute,
            stamp_manual_runs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    pub timeout_ms: u64,
    pub max_age_secs: u64,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10000,
            max_age_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
    pub rest: RestStoreConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("visitrack"),
            rest: RestStoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestStoreConfig {
    pub url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for RestStoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key_env: "VISITRACK_API_KEY".to_string(),
            timeout_ms: 10000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            auto_checkout: AutoCheckoutConfig::default(),
            gps: GpsConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try project config: ./<project>.yml
        let project_config = PathBuf::from(format!("{}.yml", project_name));
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", project_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = self.auto_checkout.cutoff.parse::<Cutoff>() {
            eyre::bail!("auto_checkout.cutoff: {}", e);
        }
        if self.auto_checkout.tick_interval_secs == 0 {
            eyre::bail!("auto_checkout.tick_interval_secs must be > 0");
        }
        if self.gps_timeout() < MIN_TIMEOUT {
            eyre::bail!("gps.timeout_ms must be >= {}", MIN_TIMEOUT.as_millis());
        }
        if self.gps_max_age() > MAX_CACHED_AGE {
            eyre::bail!("gps.max_age_secs must be <= {}", MAX_CACHED_AGE.as_secs());
        }
        if self.storage.backend == StorageBackend::Rest
            && self.storage.rest.url.as_deref().is_none_or(|u| u.trim().is_empty())
        {
            eyre::bail!("storage.rest.url is required for the rest backend");
        }
        Ok(())
    }

    pub fn tick_config(&self) -> Result<TickConfig> {
        let cutoff: Cutoff = self
            .auto_checkout
            .cutoff
            .parse()
            .context("Invalid auto_checkout.cutoff")?;
        Ok(TickConfig::new(cutoff, self.auto_checkout.target_category)
            .with_tick_interval(Duration::from_secs(self.auto_checkout.tick_interval_secs))
            .with_policy(self.auto_checkout.trigger)
            .with_stamp_manual_runs(self.auto_checkout.stamp_manual_runs))
    }

    pub fn gps_timeout(&self) -> Duration {
        Duration::from_millis(self.gps.timeout_ms)
    }

    pub fn gps_max_age(&self) -> Duration {
        Duration::from_secs(self.gps.max_age_secs)
    }

    /// REST connection settings, reading the API key from the environment
    pub fn rest_config(&self) -> Result<RestConfig> {
        let rest = &self.storage.rest;
        let url = rest
            .url
            .clone()
            .ok_or_else(|| eyre::eyre!("storage.rest.url is not set"))?;
        let api_key = std::env::var(&rest.api_key_env)
            .context(format!("{} environment variable not set", rest.api_key_env))?;
        Ok(RestConfig {
            url,
            api_key,
            timeout: Duration::from_millis(rest.timeout_ms),
        })
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.storage.data_dir.join("preferences.json")
    }
}
