use crate::site::{Site, SiteProfile};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PROXY_USERNAME_VAR: &str = "RESERVIST_PROXY_USERNAME";
pub const PROXY_PASSWORD_VAR: &str = "RESERVIST_PROXY_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sites: SitesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// DevTools websocket of an already running browser; a local Chrome is launched if unset
    pub remote_debugging_url: Option<String>,
    pub block_images: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            remote_debugging_url: None,
            block_images: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub scheme: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self { host: None, port: None, scheme: "http".to_string(), username: None, password: None }
    }
}

// Keeps credentials out of debug logs
impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ProxyConfig {
    /// `scheme://host:port`, when both host and port are configured
    pub fn server(&self) -> Option<String> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => Some(format!("{}://{}:{}", self.scheme, host, port)),
            _ => None,
        }
    }

    pub fn credentials(&self) -> Option<(String, SecretString)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => {
                Some((user.clone(), SecretString::from(password.clone())))
            }
            _ => None,
        }
    }
}

/// Per-step wait bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub page_load_secs: u64,
    pub element_secs: u64,
    pub validation_probe_secs: u64,
    pub confirmation_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { page_load_secs: 15, element_secs: 10, validation_probe_secs: 1, confirmation_secs: 10 }
    }
}

impl TimeoutConfig {
    pub fn page_load(&self) -> Duration {
        Duration::from_secs(self.page_load_secs)
    }

    pub fn element(&self) -> Duration {
        Duration::from_secs(self.element_secs)
    }

    pub fn validation_probe(&self) -> Duration {
        Duration::from_secs(self.validation_probe_secs)
    }

    pub fn confirmation(&self) -> Duration {
        Duration::from_secs(self.confirmation_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// IANA zone for log timestamps, e.g. "America/Mexico_City"; local time if unset
    pub timezone: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), timezone: None }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SitesConfig {
    pub cancellation: Site,
    pub reservation: SiteProfile,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        // If config doesn't exist, create default
        if !config_path.exists() {
            let default_config = Config::default();
            default_config.save_to(&config_path)?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Take proxy credentials from the environment when set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(user) = std::env::var(PROXY_USERNAME_VAR) {
            if !user.trim().is_empty() {
                self.proxy.username = Some(user);
            }
        }
        if let Ok(password) = std::env::var(PROXY_PASSWORD_VAR) {
            if !password.trim().is_empty() {
                self.proxy.password = Some(password);
            }
        }
    }
}

fn get_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "reservist", "reservist")
        .context("Failed to determine config directory")?;

    Ok(proj_dirs.config_dir().join("config.toml"))
}
