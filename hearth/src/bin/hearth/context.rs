use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hearth::{RedisStore, config::Settings, social::Social};

/// Settings plus the backend they point at, shared by every command.
pub struct AppContext {
    pub settings: Settings,
    pub config_path: PathBuf,
    redis_url_override: Option<String>,
}

impl AppContext {
    pub fn load(config_path: &Path, redis_url_override: Option<String>) -> Result<Self> {
        let settings = Settings::load(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        Ok(Self {
            settings,
            config_path: config_path.to_path_buf(),
            redis_url_override,
        })
    }

    /// Redis URL from `--redis-url`/`REDIS_URL`, else from the config file.
    pub fn redis_url(&self) -> Result<String> {
        match &self.redis_url_override {
            Some(url) => Ok(url.clone()),
            None => self
                .settings
                .redis_url()
                .context("No Redis URL: pass --redis-url, set REDIS_URL, or set store.redis_url in hearth.toml"),
        }
    }

    pub async fn store(&self) -> Result<RedisStore> {
        let url = self.redis_url()?;
        let prefix = self.settings.prefix()?;
        RedisStore::connect(&url, prefix)
            .await
            .with_context(|| format!("Failed to connect to Redis at {url}"))
    }

    pub async fn social(&self) -> Result<Social<RedisStore>> {
        let store = self.store().await?;
        Ok(Social::with_options(store, self.settings.transactions.options()))
    }
}
