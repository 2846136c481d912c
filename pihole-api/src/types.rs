//! Pi-hole domain types returned by [`crate::PiHoleApi`]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether DNS blocking is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockingStatus {
    Enabled,
    Disabled,
}

impl BlockingStatus {
    pub fn is_enabled(self) -> bool {
        self == BlockingStatus::Enabled
    }
}

impl fmt::Display for BlockingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingStatus::Enabled => write!(f, "enabled"),
            BlockingStatus::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GravityInfo {
    pub domains_being_blocked: u64,
    /// Epoch seconds of the last gravity update, 0 if unknown
    pub last_updated: i64,
}

/// Dashboard summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiHoleStatus {
    pub blocking: BlockingStatus,
    pub dns_queries_today: u64,
    pub ads_blocked_today: u64,
    pub ads_percentage_today: f64,
    pub unique_domains: u64,
    pub queries_forwarded: u64,
    pub queries_cached: u64,
    pub clients_ever_seen: u64,
    pub unique_clients: u64,
    pub gravity: GravityInfo,
}

/// Coarse verdict for a DNS query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Blocked,
    Allowed,
    Unknown,
    NoRecentQueries,
    NeverQueried,
}

impl QueryStatus {
    /// Map a Pi-hole status code (`GRAVITY`, `FORWARDED`, ...) or an already
    /// coarse value (`blocked`, `allowed`) to a verdict
    pub fn from_code(code: &str) -> Self {
        match code {
            "blocked" => QueryStatus::Blocked,
            "allowed" => QueryStatus::Allowed,
            "no_recent_queries" => QueryStatus::NoRecentQueries,
            "never_queried" => QueryStatus::NeverQueried,
            "FORWARDED" | "CACHE" | "CACHE_STALE" | "RETRIED" | "RETRIED_DNSSEC"
            | "IN_PROGRESS" => QueryStatus::Allowed,
            "GRAVITY" | "REGEX" | "DENYLIST" | "EXTERNAL_BLOCKED_IP"
            | "EXTERNAL_BLOCKED_NULL" | "EXTERNAL_BLOCKED_NXRA" | "GRAVITY_CNAME"
            | "REGEX_CNAME" | "DENYLIST_CNAME" | "SPECIAL_DOMAIN" => QueryStatus::Blocked,
            _ => QueryStatus::Unknown,
        }
    }

    /// Human description of a Pi-hole status code
    pub fn describe(code: &str) -> String {
        let text = match code {
            "FORWARDED" => "Allowed - forwarded to upstream DNS",
            "CACHE" => "Allowed - served from cache",
            "CACHE_STALE" => "Allowed - served from stale cache",
            "GRAVITY" => "Blocked - gravity list",
            "REGEX" => "Blocked - regex filter",
            "DENYLIST" => "Blocked - denylist",
            "EXTERNAL_BLOCKED_IP" => "Blocked - external blocklist (IP)",
            "EXTERNAL_BLOCKED_NULL" => "Blocked - external blocklist (null)",
            "EXTERNAL_BLOCKED_NXRA" => "Blocked - external blocklist (NXDOMAIN)",
            "GRAVITY_CNAME" => "Blocked - gravity list (CNAME)",
            "REGEX_CNAME" => "Blocked - regex filter (CNAME)",
            "DENYLIST_CNAME" => "Blocked - denylist (CNAME)",
            "" => "Unknown status",
            other => other,
        };
        text.to_string()
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueryStatus::Blocked => "blocked",
            QueryStatus::Allowed => "allowed",
            QueryStatus::Unknown => "unknown",
            QueryStatus::NoRecentQueries => "no recent queries",
            QueryStatus::NeverQueried => "never queried",
        };
        f.write_str(label)
    }
}

/// DNS record type; anything unrecognised is treated as `A`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    #[default]
    A,
    Aaaa,
    Ptr,
    Srv,
    Txt,
    Cname,
    Mx,
}

impl QueryType {
    pub fn from_code(code: &str) -> Self {
        match code {
            "AAAA" => QueryType::Aaaa,
            "PTR" => QueryType::Ptr,
            "SRV" => QueryType::Srv,
            "TXT" => QueryType::Txt,
            "CNAME" => QueryType::Cname,
            "MX" => QueryType::Mx,
            _ => QueryType::A,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueryType::A => "A",
            QueryType::Aaaa => "AAAA",
            QueryType::Ptr => "PTR",
            QueryType::Srv => "SRV",
            QueryType::Txt => "TXT",
            QueryType::Cname => "CNAME",
            QueryType::Mx => "MX",
        };
        f.write_str(label)
    }
}

/// Latest known resolution of a single domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiHoleQueryResult {
    pub domain: String,
    pub status: QueryStatus,
    pub reason: String,
    pub query_type: QueryType,
    /// Epoch seconds of the latest query, 0 if none
    pub last_seen: f64,
    pub query_count: u64,
}

/// One row of the query log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiHoleQuery {
    pub domain: String,
    pub status: QueryStatus,
    pub query_type: QueryType,
    pub client: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainListKind {
    Allow,
    Deny,
}

impl DomainListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DomainListKind::Allow => "allow",
            DomainListKind::Deny => "deny",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainListEntry {
    pub id: u64,
    pub domain: String,
    pub kind: DomainListKind,
    pub enabled: bool,
    pub date_added: i64,
    pub date_modified: i64,
    pub comment: String,
}

/// How long to disable blocking for. `duration` wins over `seconds`; with
/// neither set blocking stays off until re-enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisableOptions {
    /// `"30"`, `"30s"`, `"5m"`, `"1h30m"` ...
    pub duration: Option<String>,
    pub seconds: Option<u64>,
}

impl DisableOptions {
    pub fn for_seconds(seconds: u64) -> Self {
        Self {
            seconds: Some(seconds),
            ..Self::default()
        }
    }

    pub fn for_duration(duration: impl Into<String>) -> Self {
        Self {
            duration: Some(duration.into()),
            ..Self::default()
        }
    }
}
