use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::adapter::AdapterSettings;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub reporting: ReportingConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Relative skip step in seconds
    #[serde(default = "default_skip_step")]
    pub skip_step_secs: f64,

    /// How long to wait for duration metadata before going ready anyway
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    /// How long to wait for a seek confirmation
    #[serde(default = "default_seek_timeout")]
    pub seek_timeout_secs: u64,

    #[serde(default = "default_volume")]
    pub default_volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Minimum interval between outbound progress reports
    #[serde(default = "default_cadence")]
    pub cadence_secs: u64,

    /// Progress endpoint; reporting is disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Hosts served through the gated embed provider
    #[serde(default = "default_embed_hosts")]
    pub embed_hosts: Vec<String>,

    /// Hosts whose embeds keep their native controls
    #[serde(default = "default_native_hosts")]
    pub native_hosts: Vec<String>,
}

fn default_skip_step() -> f64 {
    10.0
}

fn default_ready_timeout() -> u64 {
    8
}

fn default_seek_timeout() -> u64 {
    4
}

fn default_volume() -> f64 {
    1.0
}

fn default_cadence() -> u64 {
    15
}

fn default_embed_hosts() -> Vec<String> {
    vec!["vimeo.com".to_string(), "player.vimeo.com".to_string()]
}

fn default_native_hosts() -> Vec<String> {
    vec![
        "youtube.com".to_string(),
        "youtube-nocookie.com".to_string(),
        "youtu.be".to_string(),
    ]
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            skip_step_secs: default_skip_step(),
            ready_timeout_secs: default_ready_timeout(),
            seek_timeout_secs: default_seek_timeout(),
            default_volume: default_volume(),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            cadence_secs: default_cadence(),
            endpoint: None,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            embed_hosts: default_embed_hosts(),
            native_hosts: default_native_hosts(),
        }
    }
}

impl PlaybackConfig {
    pub fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            seek_timeout: Duration::from_secs(self.seek_timeout_secs),
        }
    }
}

impl ReportingConfig {
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.cadence_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            debug!("Loading config from {:?}", config_path);
            let contents =
                fs::read_to_string(config_path).context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            info!("Config loaded successfully");
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", config_path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("watchgate").join("config.toml"))
    }
}
