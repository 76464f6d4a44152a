//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. the path given with `--config`
//! 2. `$MAILBLOG_CONFIG` (environment variable)
//! 3. `~/.config/mailblog/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailblog\config.toml` (Windows)
//! 4. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::render::RenderMode;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV_VAR: &str = "MAILBLOG_CONFIG";

const REDACTED: &str = "********";

/// RFC 2177: servers may drop an IDLE that runs longer than 30 minutes.
pub const MAX_IDLE_TIMEOUT_SECS: u64 = 29 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Mail server account and sync tuning.
    pub imap: ImapConfig,
    /// HTTP listener and access control.
    pub server: ServerConfig,
    /// Blog presentation.
    pub blog: BlogConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Directory for a log file in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

/// Mail server account and sync tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapConfig {
    /// Server hostname (implicit TLS).
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Mailbox to mirror.
    pub mailbox: String,
    /// Upper bound for any single command's response.
    pub command_timeout_secs: u64,
    /// How long one IDLE is held before it is refreshed (servers drop
    /// clients idling for 30 minutes).
    pub idle_timeout_secs: u64,
    /// Pause before reconnecting after a session failure.
    pub reconnect_backoff_secs: u64,
    /// Pause before retrying a failed push-wait on a live session.
    pub idle_retry_backoff_secs: u64,
    /// Number of newest messages fetched on each push notification.
    pub incremental_window: usize,
}

/// HTTP listener and access control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally visible base URL, used for feed links.
    pub public_url: String,
    /// Basic-auth user. Set together with `auth_password` to protect pages.
    pub auth_username: Option<String>,
    pub auth_password: Option<String>,
}

/// Blog presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlogConfig {
    pub title: String,
    /// "auto", "plain" or "markdown".
    pub render_mode: RenderMode,
    /// Number of messages kept and shown.
    pub capacity: usize,
    /// Custom page template; the built-in one is used when unset.
    pub template: Option<PathBuf>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 993,
            username: String::new(),
            password: String::new(),
            mailbox: "INBOX".to_string(),
            command_timeout_secs: 60,
            idle_timeout_secs: 25 * 60,
            reconnect_backoff_secs: 30,
            idle_retry_backoff_secs: 5,
            incremental_window: 5,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: "http://localhost:8080".to_string(),
            auth_username: None,
            auth_password: None,
        }
    }
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            title: "Live Email Blog".to_string(),
            render_mode: RenderMode::Auto,
            capacity: crate::store::DEFAULT_CAPACITY,
            template: None,
        }
    }
}

impl ImapConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn idle_retry_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_retry_backoff_secs)
    }
}

impl ServerConfig {
    /// Basic-auth credentials, if both halves are configured.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (&self.auth_username, &self.auth_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

// ── Validation ──────────────────────────────────────────────────

impl Config {
    /// Check the settings once at startup.
    ///
    /// IMAP account fields are only required when `imap_enabled` is set.
    pub fn validate(&self, imap_enabled: bool) -> Result<()> {
        if imap_enabled {
            for (name, value) in [
                ("imap.host", &self.imap.host),
                ("imap.username", &self.imap.username),
                ("imap.password", &self.imap.password),
            ] {
                if value.trim().is_empty() {
                    return Err(Error::Config(format!("{name} must be set")));
                }
            }
            if self.imap.mailbox.is_empty() {
                return Err(Error::Config("imap.mailbox must not be empty".to_string()));
            }
            if self.imap.command_timeout_secs == 0 || self.imap.idle_timeout_secs == 0 {
                return Err(Error::Config(
                    "imap timeouts must be at least one second".to_string(),
                ));
            }
            if self.imap.idle_timeout_secs > MAX_IDLE_TIMEOUT_SECS {
                return Err(Error::Config(format!(
                    "imap.idle_timeout_secs must be at most {MAX_IDLE_TIMEOUT_SECS}, got {}",
                    self.imap.idle_timeout_secs
                )));
            }
        }

        if self.blog.capacity == 0 {
            return Err(Error::Config("blog.capacity must be at least 1".to_string()));
        }
        if self.imap.incremental_window == 0 {
            return Err(Error::Config(
                "imap.incremental_window must be at least 1".to_string(),
            ));
        }

        let url = &self.server.public_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server.public_url must start with http:// or https://, got '{url}'"
            )));
        }

        if self.server.auth_username.is_some() != self.server.auth_password.is_some() {
            return Err(Error::Config(
                "server.auth_username and server.auth_password must be set together".to_string(),
            ));
        }

        Ok(())
    }

    /// A copy safe to print: secrets replaced.
    pub fn redacted(&self) -> Config {
        let mut cfg = self.clone();
        if !cfg.imap.password.is_empty() {
            cfg.imap.password = REDACTED.to_string();
        }
        if cfg.server.auth_password.is_some() {
            cfg.server.auth_password = Some(REDACTED.to_string());
        }
        cfg
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration.
///
/// An explicit `path` must exist. Otherwise the standard locations are
/// searched and defaults are used when no file is found. A file that exists
/// but cannot be read or parsed is always an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "config file '{}' does not exist",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => match config_file_path() {
            Some(p) if p.exists() => p,
            _ => {
                tracing::info!("No config file found, using defaults");
                return Ok(Config::default());
            }
        },
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    let cfg = toml::from_str::<Config>(&contents)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(cfg)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    // 1. Environment variable override
    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(env_path));
    }

    // 2. Standard config directory
    dirs::config_dir().map(|d| d.join("mailblog").join("config.toml"))
}

/// Return the log file path, if file logging is enabled.
pub fn log_file_path(config: &Config) -> Option<PathBuf> {
    config
        .general
        .log_dir
        .as_ref()
        .map(|dir| dir.join("mailblog.log"))
}
