//! Configuration management

use crate::error::{ErrorContext, PiholeError, PiholeResult};
use crate::logging::LogFormat;
use crate::types::{ConnectionConfig, LoggingSection, PiholeConfig, SessionConfig};

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_EXPIRY_SAFETY_FACTOR: f64 = 0.8;
pub const DEFAULT_REFRESH_MARGIN_SECONDS: u64 = 30;
pub const DEFAULT_REQUEST_SPACING_MS: u64 = 200;
pub const DEFAULT_RATE_LIMIT_BACKOFF_MS: u64 = 2000;

pub const ENV_URL: &str = "PIHOLE_URL";
pub const ENV_API_TOKEN: &str = "PIHOLE_API_TOKEN";
pub const ENV_TIMEOUT: &str = "PIHOLE_TIMEOUT";

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://pi.hole".to_string(),
            api_token: String::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            expiry_safety_factor: DEFAULT_EXPIRY_SAFETY_FACTOR,
            refresh_margin_seconds: DEFAULT_REFRESH_MARGIN_SECONDS,
            request_spacing_ms: DEFAULT_REQUEST_SPACING_MS,
            rate_limit_backoff_ms: DEFAULT_RATE_LIMIT_BACKOFF_MS,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl SessionConfig {
    /// Directory holding persisted sessions
    pub fn resolved_cache_dir(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => expand_home(dir),
            None => default_cache_dir(),
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl PiholeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> PiholeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PiholeError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> PiholeResult<Self> {
        toml::from_str(content).map_err(|e| PiholeError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> PiholeResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| PiholeError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content).map_err(|e| PiholeError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Load from an explicit path, or the first default location that exists,
    /// then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> PiholeResult<Self> {
        let mut config = match explicit {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                Self::from_file(path)?
            }
            None => match default_config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => {
                    info!("Loading configuration from {:?}", path);
                    Self::from_file(&path)?
                }
                None => {
                    info!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.connection.base_url = sanitize_url(&config.connection.base_url);
        Ok(config)
    }

    /// Apply `PIHOLE_*` overrides from the given lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> PiholeResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_URL) {
            debug!("Overriding base_url from {}", ENV_URL);
            self.connection.base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            debug!("Overriding api_token from {}", ENV_API_TOKEN);
            self.connection.api_token = token;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT) {
            self.connection.timeout_seconds =
                timeout.trim().parse().map_err(|e| PiholeError::Config {
                    message: format!("{} must be a whole number of seconds: {}", ENV_TIMEOUT, e),
                    source: Some(Box::new(e)),
                    context: ErrorContext::new("config").with_operation("env_override"),
                })?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> PiholeResult<()> {
        if self.connection.base_url.trim().is_empty() {
            return Err(PiholeError::Config {
                message: "connection.base_url must not be empty".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set connection.base_url to your Pi-hole address"),
            });
        }

        if url::Url::parse(&sanitize_url(&self.connection.base_url)).is_err() {
            return Err(PiholeError::Config {
                message: format!("connection.base_url is not a valid URL: {}", self.connection.base_url),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Use a value like http://pi.hole or https://192.168.1.2"),
            });
        }

        if self.connection.timeout_seconds == 0 {
            return Err(PiholeError::Config {
                message: "connection.timeout_seconds must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set connection.timeout_seconds to a positive value"),
            });
        }

        let factor = self.session.expiry_safety_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(PiholeError::Config {
                message: "session.expiry_safety_factor must be in (0, 1]".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("The default of 0.8 trusts 80% of the server validity"),
            });
        }

        Ok(())
    }
}

/// Candidate config file locations, most specific first
pub fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::config_dir().map(|d| d.join("pihole").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".pihole").join("config.toml")),
        Some(PathBuf::from("pihole.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Where `pihole config --init` writes
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pihole")
        .join("config.toml")
}

pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("pihole-sessions")
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Normalise a user-supplied Pi-hole address.
///
/// Trims whitespace, defaults the scheme to `http://`, and drops trailing
/// slashes and a trailing `/admin` segment (the web UI path users tend to
/// paste).
pub fn sanitize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut url = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    loop {
        let before = url.len();
        while url.ends_with('/') {
            url.pop();
        }
        if url.ends_with("/admin") {
            url.truncate(url.len() - "/admin".len());
        }
        if url.len() == before {
            break;
        }
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn sanitize_url_normalises_common_inputs() {
        assert_eq!(sanitize_url("pi.hole"), "http://pi.hole");
        assert_eq!(sanitize_url(" https://pi.example.local/ "), "https://pi.example.local");
        assert_eq!(sanitize_url("http://192.168.1.2/admin/"), "http://192.168.1.2");
        assert_eq!(sanitize_url("http://pi.hole:8080//"), "http://pi.hole:8080");
        assert_eq!(sanitize_url(""), "");
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            (ENV_URL, "https://pi.example.local"),
            (ENV_API_TOKEN, "secret"),
            (ENV_TIMEOUT, "25"),
        ]
        .into_iter()
        .collect();

        let mut config = PiholeConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.connection.base_url, "https://pi.example.local");
        assert_eq!(config.connection.api_token, "secret");
        assert_eq!(config.connection.timeout_seconds, 25);
    }

    #[test]
    fn bad_timeout_override_is_a_config_error() {
        let mut config = PiholeConfig::default();
        let result = config.apply_env_overrides(|k| (k == ENV_TIMEOUT).then(|| "soon".to_string()));
        assert!(matches!(result, Err(PiholeError::Config { .. })));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PiholeConfig::from_toml_str(
            r#"
            [connection]
            base_url = "http://10.0.0.2"
            api_token = "pw"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.base_url, "http://10.0.0.2");
        assert_eq!(config.connection.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
        assert_eq!(config.session.request_spacing_ms, DEFAULT_REQUEST_SPACING_MS);
        assert_eq!(config.session.expiry_safety_factor, DEFAULT_EXPIRY_SAFETY_FACTOR);
    }

    #[test]
    fn cache_dir_expands_home() {
        let session = SessionConfig {
            cache_dir: Some("/tmp/pihole-test".to_string()),
            ..Default::default()
        };
        assert_eq!(session.resolved_cache_dir(), PathBuf::from("/tmp/pihole-test"));
    }
}
