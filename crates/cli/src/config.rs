use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;
use waymark_core::BackgroundConfig;

/// CLI configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Thread caps for the built-in pools. Environment variables win over
    /// values set here.
    #[serde(default)]
    pub background: BackgroundConfig,

    /// Worker threads for the conversion pool registered by the console.
    #[serde(default = "default_convert_threads")]
    pub convert_threads: usize,

    /// How often the UI loop drains worker requests, in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_convert_threads() -> usize {
    1
}

fn default_tick_ms() -> u64 {
    50
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            background: BackgroundConfig::default(),
            convert_threads: default_convert_threads(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl CliConfig {
    /// Return the default config directory path: ~/.config/waymark/
    pub fn default_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("could not determine user config directory")?
            .join("waymark");
        Ok(config_dir)
    }

    /// Return the default config file path.
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Load config from the given path, or the default path.
    /// Returns default config if the file does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            debug!(?config_path, "Loading config");
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read config: {}", config_path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("failed to parse config: {}", config_path.display()))
        } else {
            debug!(?config_path, "Config file not found, using defaults");
            let config = Self::default();
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let toml_str = toml::to_string_pretty(&config)
                .context("failed to serialize default config")?;
            std::fs::write(&config_path, toml_str).ok();
            Ok(config)
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve the built-in pool caps. Priority: env > config file > default.
    pub fn resolve_background(&self, from_env: &BackgroundConfig) -> BackgroundConfig {
        self.background.clone().merge(from_env)
    }
}
