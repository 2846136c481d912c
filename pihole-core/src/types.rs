//! Core data type definitions

use crate::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// On-disk session record, one per base URL
///
/// Field names are part of the cache file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub session_id: String,
    pub csrf_token: String,
    /// Absolute expiry, epoch milliseconds
    pub session_expiry: i64,
    pub base_url: String,
}

impl PersistedSession {
    /// Whether this record may be reused for `base_url` at `now_ms`
    pub fn is_usable_for(&self, base_url: &str, now_ms: i64) -> bool {
        self.base_url == base_url && now_ms < self.session_expiry
    }
}

/// Outcome of a connection probe. Never an error; failures land in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTestResult {
    pub fn ok(version: Option<String>) -> Self {
        Self {
            success: true,
            version,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            version: None,
            error: Some(error.into()),
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PiholeConfig {
    pub connection: ConnectionConfig,
    pub session: SessionConfig,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Pi-hole base URL, e.g. `http://pi.hole`
    pub base_url: String,
    /// Web interface password or application password
    pub api_token: String,
    /// Timeout for every network call, in seconds
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory for persisted sessions (`None` = user cache dir)
    pub cache_dir: Option<String>,
    /// Fraction of the server-declared validity the client trusts
    pub expiry_safety_factor: f64,
    /// Re-authenticate when the session expires within this many seconds
    pub refresh_margin_seconds: u64,
    /// Flat pause before every request, in milliseconds
    pub request_spacing_ms: u64,
    /// Pause before retrying a rate-limited request, in milliseconds
    pub rate_limit_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
}
