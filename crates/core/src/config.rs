use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WaymarkError};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Load a specific env file. Unlike [`load_dotenv`], a missing or malformed
/// file is reported.
pub fn load_dotenv_from(path: &Path) -> Result<()> {
    dotenvy::from_path(path)
        .map(|_| ())
        .map_err(|e| WaymarkError::Env(format!("{}: {}", path.display(), e)))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_usize(profile: &str, key: &str) -> Result<Option<usize>> {
    match profiled_env_opt(profile, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| WaymarkError::InvalidSetting {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub background: BackgroundConfig,
    /// Fallback tracing filter when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `WAYMARK_PROFILE`. When set (e.g. `LAPTOP`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self> {
        let profile = env_or("WAYMARK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Ok(Self {
            profile: p.to_string(),
            background: BackgroundConfig::from_env_profiled(p)?,
            log_filter: profiled_env_or(p, "WAYMARK_LOG", "info"),
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  background:  max_threads={}, max_threads_local={}",
            describe(self.background.max_threads),
            describe(self.background.max_threads_local)
        );
        tracing::info!("  log:         filter={}", self.log_filter);
    }

    /// Summary view for `config` style commands.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "background": {
                "max_threads": self.background.max_threads,
                "max_threads_local": self.background.max_threads_local,
            },
            "log_filter": self.log_filter,
        })
    }
}

fn describe(value: Option<usize>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "(auto)".to_string())
}

// ── Background jobs ───────────────────────────────────────────

/// Thread caps for the two built-in background pools.
///
/// `None` leaves the pool at its built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundConfig {
    /// Cap for the network-bound pool (`BACKGROUND_MAX_THREADS`).
    #[serde(default)]
    pub max_threads: Option<usize>,
    /// Cap for the CPU-bound pool (`BACKGROUND_MAX_THREADS_LOCAL`).
    #[serde(default)]
    pub max_threads_local: Option<usize>,
}

impl BackgroundConfig {
    fn from_env_profiled(p: &str) -> Result<Self> {
        Ok(Self {
            max_threads: profiled_env_usize(p, "BACKGROUND_MAX_THREADS")?,
            max_threads_local: profiled_env_usize(p, "BACKGROUND_MAX_THREADS_LOCAL")?,
        })
    }

    /// Overlay `other` on top of `self`; values set in `other` win.
    pub fn merge(self, other: &BackgroundConfig) -> Self {
        Self {
            max_threads: other.max_threads.or(self.max_threads),
            max_threads_local: other.max_threads_local.or(self.max_threads_local),
        }
    }
}
