//! `hearth.toml` settings.
//!
//! ```toml
//! [store]
//! redis_url = "${REDIS_URL}"
//! prefix = "hearth"
//!
//! [transactions]
//! max_attempts = 5
//! backoff_ms = 25
//! ```
//!
//! Every section and key is optional. `${NAME}` inside a string is replaced by the environment
//! variable `NAME` when the value is read.

use std::{path::Path, sync::LazyLock, time::Duration};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::{errors::ConfigError, transaction::TransactionOptions};

pub const DEFAULT_CONFIG_FILE: &str = "hearth.toml";

static ENV_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern is valid"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub transactions: TransactionSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            prefix: default_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    "${REDIS_URL}".to_string()
}

fn default_prefix() -> String {
    "hearth".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    TransactionOptions::default().max_attempts
}

fn default_backoff_ms() -> u64 {
    TransactionOptions::default().backoff.as_millis() as u64
}

impl TransactionSettings {
    pub fn options(&self) -> TransactionOptions {
        TransactionOptions::new(self.max_attempts, Duration::from_millis(self.backoff_ms))
    }
}

impl Settings {
    /// Loads settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("config: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Redis URL with environment references expanded.
    pub fn redis_url(&self) -> Result<String, ConfigError> {
        expand_env(&self.store.redis_url)
    }

    pub fn prefix(&self) -> Result<String, ConfigError> {
        expand_env(&self.store.prefix)
    }
}

/// Replaces every `${NAME}` in `value` with the variable's value.
pub fn expand_env(value: &str) -> Result<String, ConfigError> {
    expand_with(value, |name| std::env::var(name).ok())
}

fn expand_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    let mut missing = None;
    let expanded = ENV_REFERENCE.replace_all(value, |captures: &Captures<'_>| {
        let name = &captures[1];
        lookup(name).unwrap_or_else(|| {
            missing.get_or_insert_with(|| name.to_string());
            String::new()
        })
    });
    match missing {
        Some(name) => Err(ConfigError::MissingVariable { name }),
        None => Ok(expanded.into_owned()),
    }
}
