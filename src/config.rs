use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::render::RenderOptions;
use crate::security::{default_rules, RateLimitRule, MAX_WINDOW_SECS};

pub const DEFAULT_CONFIG_FILE: &str = "qrsmith.toml";
pub const ART_URL_ENV: &str = "QRSMITH_ART_URL";
pub const ART_KEY_ENV: &str = "QRSMITH_ART_KEY";

/// Everything read from `qrsmith.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub render: RenderOptions,
    /// Per-feature overrides; features not listed keep their built-in budget.
    pub rate_limits: HashMap<String, RateLimitRule>,
    pub art: ArtSettings,
    pub store: StoreSettings,
    pub preview: PreviewSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ArtSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl ArtSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".qrsmith/store.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    pub debounce_ms: u64,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

impl PreviewSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Settings {
    /// Loads `path`, or `qrsmith.toml` in the working directory when no path is given.
    /// A missing default file is not an error; a missing explicit one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let settings = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        for (feature, rule) in &settings.rate_limits {
            if rule.max_requests == 0 || rule.window_secs == 0 {
                return Err(Error::Config(format!(
                    "rate limit for {feature} needs a non-zero max_requests and window_secs"
                )));
            }
            if rule.window_secs > MAX_WINDOW_SECS {
                return Err(Error::Config(format!(
                    "rate limit window for {feature} exceeds {MAX_WINDOW_SECS} seconds"
                )));
            }
        }
        Ok(settings)
    }

    /// Environment wins over the file for the art function's URL and key.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ART_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.art.endpoint = Some(url);
        }
        if let Some(key) = lookup(ART_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.art.api_key = Some(key);
        }
    }

    /// Built-in budgets with the file's overrides applied.
    pub fn rate_limit_rules(&self) -> HashMap<String, RateLimitRule> {
        let mut rules = default_rules();
        rules.extend(self.rate_limits.iter().map(|(k, v)| (k.clone(), *v)));
        rules
    }
}
