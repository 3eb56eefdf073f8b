//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes base URL overrides, the default feed page size and the
//! last used email address.
//!
//! Configuration is stored at `~/.config/glowscan/config.json`. Base URLs
//! can also be supplied through `GLOWSCAN_API_URL`, `GLOWSCAN_SCAN_URL` and
//! `GLOWSCAN_CHAT_URL`, which take precedence over the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "glowscan";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "https://api.glowscan.app";
const DEFAULT_SCAN_BASE_URL: &str = "https://scan.glowscan.app";
const DEFAULT_CHAT_BASE_URL: &str = "https://chat.glowscan.app";

pub const API_URL_ENV: &str = "GLOWSCAN_API_URL";
pub const SCAN_URL_ENV: &str = "GLOWSCAN_SCAN_URL";
pub const CHAT_URL_ENV: &str = "GLOWSCAN_CHAT_URL";

/// Connect/read/write budget for every HTTP call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of items requested per feed page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Base URLs of the three remote services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub api_base_url: String,
    pub scan_base_url: String,
    pub chat_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            scan_base_url: DEFAULT_SCAN_BASE_URL.to_string(),
            chat_base_url: DEFAULT_CHAT_BASE_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Point all three services at one host. Handy for tests and local stacks.
    pub fn single(base_url: &str) -> Self {
        let base = normalize_base(base_url);
        Self {
            api_base_url: base.clone(),
            scan_base_url: base.clone(),
            chat_base_url: base,
        }
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    pub fn scan(&self, path: &str) -> String {
        format!("{}{}", self.scan_base_url, path)
    }

    pub fn chat(&self, path: &str) -> String {
        format!("{}{}", self.chat_base_url, path)
    }
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Pick the first non-empty value: env, then file, then default.
fn resolve(env: Option<String>, file: Option<&String>, default: &str) -> String {
    env.filter(|v| !v.trim().is_empty())
        .or_else(|| file.filter(|v| !v.trim().is_empty()).cloned())
        .map(|v| normalize_base(&v))
        .unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub scan_base_url: Option<String>,
    pub chat_base_url: Option<String>,
    pub page_size: Option<u32>,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the credential vault, profile file and logs.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Resolve the service base URLs from the process environment.
    pub fn endpoints(&self) -> Endpoints {
        self.endpoints_with(|key| std::env::var(key).ok())
    }

    /// Resolve the service base URLs with a custom environment lookup.
    pub fn endpoints_with(&self, env: impl Fn(&str) -> Option<String>) -> Endpoints {
        Endpoints {
            api_base_url: resolve(env(API_URL_ENV), self.api_base_url.as_ref(), DEFAULT_API_BASE_URL),
            scan_base_url: resolve(env(SCAN_URL_ENV), self.scan_base_url.as_ref(), DEFAULT_SCAN_BASE_URL),
            chat_base_url: resolve(env(CHAT_URL_ENV), self.chat_base_url.as_ref(), DEFAULT_CHAT_BASE_URL),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.filter(|&s| s > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }
}
