use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_PAGE_SIZE, DEFAULT_VIEWPORT_ROWS, HTTP_TIMEOUT_SECS, QR_DEFAULT_MARGIN,
    QR_DEFAULT_SIZE, QR_MAX_MARGIN, QR_MAX_SIZE, QUERY_CACHE_MAX_ENTRIES, QUERY_CACHE_TTL_SECS, SENTINEL_MARGIN_PX,
    SENTINEL_THRESHOLD, SETTLE_DELAY_MS,
};

const ENV_API_URL: &str = "ROSTER_API_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    /// Pagination and incremental loading
    #[serde(default)]
    pub list: ListConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Certificate QR rendering
    #[serde(default)]
    pub qr: QrConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API, e.g. `https://example.org/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Public site URL used to build certificate verification links
    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            site_url: default_site_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    /// Records requested per page (fixed for a view)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// How long the "loading more" indicator lingers after a page arrives (0 = off)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_sentinel_margin_px")]
    pub sentinel_margin_px: f64,
    #[serde(default = "default_sentinel_threshold")]
    pub sentinel_threshold: f64,
    /// Terminal rows treated as the visible viewport
    #[serde(default = "default_viewport_rows")]
    pub viewport_rows: u32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            settle_delay_ms: default_settle_delay_ms(),
            sentinel_margin_px: default_sentinel_margin_px(),
            sentinel_threshold: default_sentinel_threshold(),
            viewport_rows: default_viewport_rows(),
        }
    }
}

impl ListConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfig {
    /// Edge length in pixels
    #[serde(default = "default_qr_size")]
    pub size: u32,
    /// Light modules around the symbol on each side
    #[serde(default = "default_qr_margin")]
    pub margin: u32,
    #[serde(default = "default_foreground")]
    pub foreground: String,
    #[serde(default = "default_background")]
    pub background: String,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            size: default_qr_size(),
            margin: default_qr_margin(),
            foreground: default_foreground(),
            background: default_background(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_site_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout_secs() -> u64 {
    HTTP_TIMEOUT_SECS
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_settle_delay_ms() -> u64 {
    SETTLE_DELAY_MS
}

fn default_sentinel_margin_px() -> f64 {
    SENTINEL_MARGIN_PX
}

fn default_sentinel_threshold() -> f64 {
    SENTINEL_THRESHOLD
}

fn default_viewport_rows() -> u32 {
    DEFAULT_VIEWPORT_ROWS
}

fn default_max_entries() -> u64 {
    QUERY_CACHE_MAX_ENTRIES
}

fn default_ttl_secs() -> u64 {
    QUERY_CACHE_TTL_SECS
}

fn default_qr_size() -> u32 {
    QR_DEFAULT_SIZE
}

fn default_qr_margin() -> u32 {
    QR_DEFAULT_MARGIN
}

fn default_foreground() -> String {
    "#000000".to_string()
}

fn default_background() -> String {
    "#ffffff".to_string()
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("roster");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load the user config, falling back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = env::var(ENV_API_URL)
            && !url.trim().is_empty()
        {
            self.api.base_url = url.trim().to_string();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.list.page_size == 0 {
            anyhow::bail!("list.page_size must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.list.sentinel_threshold) {
            anyhow::bail!("list.sentinel_threshold must be between 0.0 and 1.0");
        }
        if self.qr.margin > QR_MAX_MARGIN {
            anyhow::bail!("qr.margin must be at most {} modules", QR_MAX_MARGIN);
        }
        if self.qr.size > QR_MAX_SIZE {
            anyhow::bail!("qr.size must be at most {} pixels", QR_MAX_SIZE);
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(Self::config_dir()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.list.page_size, 12);
        assert_eq!(config.list.settle_delay_ms, 2000);
        assert_eq!(config.list.sentinel_margin_px, 100.0);
        assert_eq!(config.list.sentinel_threshold, 0.1);
        assert_eq!(config.qr.foreground, "#000000");
        assert_eq!(config.cache.max_entries, 256);
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
            [api]
            base_url = "https://directory.example.org/api"

            [list]
            page_size = 20
            settle_delay_ms = 0
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.api.base_url, "https://directory.example.org/api");
        assert_eq!(config.api.timeout_secs, 15);
        assert_eq!(config.list.page_size, 20);
        assert_eq!(config.list.settle_delay(), Duration::ZERO);
        assert_eq!(config.list.viewport_rows, 24);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.list.page_size = 8;
        config.qr.background = "#fafafa".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.list.page_size, 8);
        assert_eq!(loaded.qr.background, "#fafafa");
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[list]\npage_size = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn test_oversized_qr_margin_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[qr]\nmargin = 1000\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("qr.margin"));
    }
}
