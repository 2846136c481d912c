//! Session record, lifecycle state and timing policy

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use pihole_core::{
    PersistedSession, SessionConfig, DEFAULT_EXPIRY_SAFETY_FACTOR, DEFAULT_RATE_LIMIT_BACKOFF_MS,
    DEFAULT_REFRESH_MARGIN_SECONDS, DEFAULT_REQUEST_SPACING_MS,
};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Length of the store key derived from a base URL
const STORE_KEY_LEN: usize = 16;

/// Timing constants governing session reuse and request pacing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionPolicy {
    /// Fraction of the server-declared validity that is trusted
    pub expiry_safety_factor: f64,
    /// A session this close to expiry is renewed before use
    pub refresh_margin: Duration,
    /// Flat pause before every request
    pub request_spacing: Duration,
    /// Pause before the single retry of a rate-limited request
    pub rate_limit_backoff: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            expiry_safety_factor: DEFAULT_EXPIRY_SAFETY_FACTOR,
            refresh_margin: Duration::from_secs(DEFAULT_REFRESH_MARGIN_SECONDS),
            request_spacing: Duration::from_millis(DEFAULT_REQUEST_SPACING_MS),
            rate_limit_backoff: Duration::from_millis(DEFAULT_RATE_LIMIT_BACKOFF_MS),
        }
    }
}

impl From<&SessionConfig> for SessionPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            expiry_safety_factor: config.expiry_safety_factor,
            refresh_margin: Duration::from_secs(config.refresh_margin_seconds),
            request_spacing: Duration::from_millis(config.request_spacing_ms),
            rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
        }
    }
}

/// Server-issued credentials plus the locally computed expiry
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub sid: String,
    pub csrf: String,
    pub expires_at: DateTime<Utc>,
    pub base_url: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("sid", &redact(&self.sid))
            .field("csrf", &redact(&self.csrf))
            .field("expires_at", &self.expires_at)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Session {
    /// Build a session from a login response.
    ///
    /// `expires_at = now + validity_seconds * 1000 * safety_factor` (ms).
    pub fn from_login(
        sid: String,
        csrf: String,
        validity_seconds: f64,
        safety_factor: f64,
        base_url: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let trusted_ms = (validity_seconds.max(0.0) * 1000.0 * safety_factor).round();
        // Clamp to a year; anything longer is a server bug.
        let trusted_ms = trusted_ms.min(365.0 * 24.0 * 3600.0 * 1000.0) as i64;
        Self {
            sid,
            csrf,
            expires_at: now + chrono::Duration::milliseconds(trusted_ms),
            base_url: base_url.to_string(),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// True once `now` is within `margin` of expiry (or past it)
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin =
            chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::days(36_500));
        match self.expires_at.checked_sub_signed(margin) {
            Some(refresh_at) => now >= refresh_at,
            None => true,
        }
    }

    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            session_id: self.sid.clone(),
            csrf_token: self.csrf.clone(),
            session_expiry: self.expires_at.timestamp_millis(),
            base_url: self.base_url.clone(),
        }
    }

    /// Restore a persisted record, rejecting one for another URL or already
    /// past its expiry
    pub fn from_persisted(
        record: PersistedSession,
        base_url: &str,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if !record.is_usable_for(base_url, now.timestamp_millis()) {
            return None;
        }
        let expires_at = Utc.timestamp_millis_opt(record.session_expiry).single()?;
        Some(Self {
            sid: record.session_id,
            csrf: record.csrf_token,
            expires_at,
            base_url: record.base_url,
        })
    }
}

/// Observable lifecycle of a client's session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated { expires_at: DateTime<Utc> },
    Expired { expired_at: DateTime<Utc> },
}

/// Deterministic store key for a base URL: SHA-256, URL-safe base64, truncated
pub fn session_store_key(base_url: &str) -> String {
    let digest = Sha256::digest(base_url.as_bytes());
    let mut encoded = URL_SAFE_NO_PAD.encode(digest);
    encoded.truncate(STORE_KEY_LEN);
    encoded
}

fn redact(token: &str) -> String {
    match token.char_indices().nth(4) {
        Some((idx, _)) => format!("{}…", &token[..idx]),
        None => "…".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().unwrap()
    }

    #[test]
    fn expiry_uses_safety_factor() {
        let now = at(1_000_000);
        let session = Session::from_login(
            "S1".into(),
            "C1".into(),
            600.0,
            0.8,
            "https://pi.example.local",
            now,
        );
        assert_eq!(session.expires_at.timestamp_millis(), 1_000_000 + 480_000);
        assert!(session.is_valid_at(now));
        assert!(!session.is_valid_at(at(1_480_000)));
    }

    #[test]
    fn refresh_margin_triggers_before_expiry() {
        let session = Session {
            sid: "S1".into(),
            csrf: "C1".into(),
            expires_at: at(100_000),
            base_url: "http://pi.hole".into(),
        };
        let margin = Duration::from_secs(30);
        assert!(!session.needs_refresh(at(69_999), margin));
        assert!(session.needs_refresh(at(70_000), margin));
        assert!(session.needs_refresh(at(200_000), margin));
        // still valid, but too close to expiry to be reused
        assert!(session.is_valid_at(at(80_000)));
    }

    #[test]
    fn persisted_record_is_filtered_on_load() {
        let now = at(5_000);
        let record = PersistedSession {
            session_id: "S1".into(),
            csrf_token: "C1".into(),
            session_expiry: 10_000,
            base_url: "http://pi.hole".into(),
        };

        let restored = Session::from_persisted(record.clone(), "http://pi.hole", now).unwrap();
        assert_eq!(restored.sid, "S1");
        assert_eq!(restored.to_persisted(), record);

        assert!(Session::from_persisted(record.clone(), "http://other", now).is_none());
        assert!(Session::from_persisted(record, "http://pi.hole", at(10_000)).is_none());
    }

    #[test]
    fn store_key_is_stable_and_distinct() {
        let a = session_store_key("https://pi.example.local");
        let b = session_store_key("https://pi2.example.local");
        assert_eq!(a, session_store_key("https://pi.example.local"));
        assert_ne!(a, b);
        assert_eq!(a.len(), STORE_KEY_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let session = Session {
            sid: "abcdefghijkl".into(),
            csrf: "zyxwvutsrq".into(),
            expires_at: at(0),
            base_url: "http://pi.hole".into(),
        };
        let printed = format!("{:?}", session);
        assert!(!printed.contains("abcdefghijkl"));
        assert!(!printed.contains("zyxwvutsrq"));
    }
}
