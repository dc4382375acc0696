use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConciergeError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConciergeConfig {
    pub classifier: ClassifierConfig,
    pub cache: CacheConfig,
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum confidence for a local answer to be published.
    pub publish_threshold: f64,
    /// Topic weight that leaves the computed confidence unscaled.
    pub reference_weight: f64,
    pub max_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// Upper bound passed to the catalog on a full listing refresh.
    pub fetch_limit: usize,
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub history_limit: usize,
    pub product_limit: usize,
    pub remote_timeout_secs: u64,
    pub greetings: Vec<String>,
    pub greeting_topic: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            publish_threshold: 0.85,
            reference_weight: 0.95,
            max_confidence: 0.99,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            fetch_limit: 250,
            fetch_timeout_secs: 15,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            product_limit: 3,
            remote_timeout_secs: 60,
            greetings: [
                "xin chào",
                "chào bạn",
                "chào shop",
                "chào",
                "hello",
                "hi",
                "hey",
                "alo",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            greeting_topic: "greeting".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl RouterConfig {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

impl ConciergeConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let c = &self.classifier;
        if !(c.publish_threshold > 0.0 && c.publish_threshold <= 1.0) {
            return Err("classifier.publish_threshold must be in (0.0, 1.0]".into());
        }
        if !(c.max_confidence > 0.0 && c.max_confidence <= 1.0) {
            return Err("classifier.max_confidence must be in (0.0, 1.0]".into());
        }
        if c.publish_threshold > c.max_confidence {
            return Err("classifier.publish_threshold must be <= max_confidence".into());
        }
        if c.reference_weight <= 0.0 {
            return Err("classifier.reference_weight must be > 0".into());
        }
        if self.cache.fetch_limit == 0 {
            return Err("cache.fetch_limit must be > 0".into());
        }
        if self.cache.fetch_timeout_secs == 0 {
            return Err("cache.fetch_timeout_secs must be > 0".into());
        }
        if self.router.history_limit == 0 {
            return Err("router.history_limit must be > 0".into());
        }
        if self.router.remote_timeout_secs == 0 {
            return Err("router.remote_timeout_secs must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConciergeError::Config(format!("Failed to read config file: {}", e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ConciergeError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate().map_err(ConciergeError::Config)?;
        Ok(config)
    }

    /// `<config dir>/concierge/config.json`, or `./concierge.json` when the
    /// platform has no config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("concierge").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("concierge.json"))
    }

    /// Load from [`Self::default_path`] when present, otherwise use defaults.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::from_file(&path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }
}
