//! Session-authenticated HTTP client
//!
//! `SessionClient` owns the login lifecycle for one Pi-hole base URL:
//!
//! - logs in on demand and reuses the session until it is within the refresh
//!   margin of expiry
//! - coalesces concurrent logins so N callers cause one network login
//! - persists the session through a [`SessionStore`] so separate processes
//!   can share it
//! - passes the session id as the `sid` query parameter and the CSRF token as
//!   a header on mutating verbs
//! - retries a logical call at most once, after a 401 (re-login) or a 429
//!   (fixed backoff)

use chrono::Utc;
use pihole_core::{
    log_operation_error, log_operation_start, log_operation_success, sanitize_url,
    validation_error, with_timeout, ConnectionTestResult, ErrorContext, ErrorKind, PiholeConfig,
    PiholeError, PiholeResult, RequestPacer, SessionStore,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::session::{session_store_key, Session, SessionPolicy, SessionState};

pub const DEFAULT_USER_AGENT: &str = concat!("pihole-api/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_LOGIN_PATH: &str = "/api/auth";
pub const DEFAULT_PROBE_PATH: &str = "/api/stats/summary";
pub const DEFAULT_CSRF_HEADER: &str = "X-Pi-hole-CSRF";

const LOGIN_RATE_LIMITED_MESSAGE: &str =
    "Too many login attempts. Please wait a moment before trying again.";
const LOGIN_TIMEOUT_MESSAGE: &str = "Authentication request timed out";
const REQUEST_TIMEOUT_MESSAGE: &str = "Request timed out";
const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid authentication credentials";

/// Constructor input for [`SessionClient`]
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Password or application password sent to the login endpoint
    pub password: String,
    /// Timeout applied to every network call unless overridden per request
    pub timeout: Duration,
    pub user_agent: String,
    pub login_path: String,
    pub probe_path: String,
    pub csrf_header: String,
    pub policy: SessionPolicy,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("login_path", &self.login_path)
            .field("probe_path", &self.probe_path)
            .field("csrf_header", &self.csrf_header)
            .field("policy", &self.policy)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            password: password.into(),
            timeout: Duration::from_secs(pihole_core::DEFAULT_TIMEOUT_SECONDS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            csrf_header: DEFAULT_CSRF_HEADER.to_string(),
            policy: SessionPolicy::default(),
        }
    }

    pub fn from_pihole_config(config: &PiholeConfig) -> Self {
        Self {
            timeout: config.connection.timeout(),
            policy: SessionPolicy::from(&config.session),
            ..Self::new(&config.connection.base_url, &config.connection.api_token)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Per-call options for [`SessionClient::request`]
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Overrides [`ClientConfig::timeout`] for this call
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn put(body: Value) -> Self {
        Self {
            method: Method::PUT,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn patch(body: Value) -> Self {
        Self {
            method: Method::PATCH,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Why an attempt is a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    RateLimited,
    Unauthorized,
}

/// One outbound call of a logical request
#[derive(Debug, Clone, Copy)]
pub struct RequestAttempt<'a> {
    pub endpoint: &'a str,
    pub options: &'a RequestOptions,
    pub retry: Option<RetryReason>,
}

impl<'a> RequestAttempt<'a> {
    pub fn first(endpoint: &'a str, options: &'a RequestOptions) -> Self {
        Self {
            endpoint,
            options,
            retry: None,
        }
    }

    /// The follow-up attempt, or `None` once the single retry is spent
    pub fn retried(self, reason: RetryReason) -> Option<Self> {
        match self.retry {
            Some(_) => None,
            None => Some(Self {
                retry: Some(reason),
                ..self
            }),
        }
    }

    pub fn number(&self) -> u8 {
        if self.retry.is_some() {
            2
        } else {
            1
        }
    }
}

enum AttemptOutcome {
    Success(Vec<u8>),
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },
    Unauthorized {
        message: String,
    },
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    session: LoginSession,
}

#[derive(Debug, Deserialize)]
struct LoginSession {
    valid: bool,
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    csrf: Option<String>,
    #[serde(default)]
    validity: f64,
    #[serde(default)]
    message: Option<String>,
}

/// Outcome of the most recent login, replayed to callers that waited on it
#[derive(Debug, Clone)]
struct AuthFailure {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    duration_ms: u64,
}

impl AuthFailure {
    fn from_error(error: &PiholeError) -> Self {
        let duration_ms = match error {
            PiholeError::RequestTimeout { duration_ms, .. } => *duration_ms,
            _ => 0,
        };
        Self {
            kind: error.kind(),
            message: error.to_string(),
            status: error.status(),
            duration_ms,
        }
    }

    fn replay(&self) -> PiholeError {
        let context = ErrorContext::new("session_client")
            .with_operation("authenticate")
            .with_metadata("coalesced", "true");
        match self.kind {
            ErrorKind::AuthenticationRateLimited => PiholeError::AuthenticationRateLimited {
                message: self.message.clone(),
                context,
            },
            ErrorKind::RequestTimeout => PiholeError::RequestTimeout {
                message: self.message.clone(),
                operation: "authenticate".to_string(),
                duration_ms: self.duration_ms,
                context,
            },
            ErrorKind::Network => PiholeError::Network {
                message: self.message.trim_start_matches("Network error: ").to_string(),
                source: None,
                context,
            },
            _ => PiholeError::AuthenticationFailed {
                message: self.message.clone(),
                status: self.status,
                context,
            },
        }
    }
}

/// Result of the most recent login, shared with callers that waited on it
#[derive(Debug, Default)]
struct AuthLedger {
    last_outcome: Option<Result<Session, AuthFailure>>,
}

/// Clears the authenticating flag even if the login future is dropped
struct AuthenticatingGuard<'a>(&'a AtomicBool);

impl<'a> AuthenticatingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for AuthenticatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Session-authenticated client for one Pi-hole base URL
pub struct SessionClient {
    http: reqwest::Client,
    config: ClientConfig,
    store: Arc<dyn SessionStore>,
    store_key: String,
    pacer: RequestPacer,
    session: RwLock<Option<Session>>,
    /// Held for the duration of a network login
    auth_gate: Mutex<AuthLedger>,
    /// Bumped after every completed login attempt
    auth_epoch: AtomicU64,
    authenticating: AtomicBool,
}

impl fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.config.base_url)
            .field("store_key", &self.store_key)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Create a client, restoring a persisted session for the same base URL
    /// when one exists and has not expired.
    pub async fn new(mut config: ClientConfig, store: Arc<dyn SessionStore>) -> PiholeResult<Self> {
        config.base_url = sanitize_url(&config.base_url);
        if Url::parse(&config.base_url).is_err() {
            return Err(validation_error!(
                format!("Invalid Pi-hole URL: '{}'", config.base_url),
                "base_url",
                "session_client"
            ));
        }

        let http = create_http_client(&config)?;
        let store_key = session_store_key(&config.base_url);

        let session = match store.load(&store_key).await {
            Ok(Some(record)) => {
                let restored = Session::from_persisted(record, &config.base_url, Utc::now());
                match &restored {
                    Some(session) => {
                        debug!(expires_at = %session.expires_at, "Restored persisted session")
                    }
                    None => debug!("Discarding persisted session (expired or other host)"),
                }
                restored
            }
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable persisted session");
                None
            }
        };

        info!("Created Pi-hole session client for {}", config.base_url);

        Ok(Self {
            http,
            pacer: RequestPacer::new(config.policy.request_spacing),
            config,
            store,
            store_key,
            session: RwLock::new(session),
            auth_gate: Mutex::new(AuthLedger::default()),
            auth_epoch: AtomicU64::new(0),
            authenticating: AtomicBool::new(false),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    pub async fn state(&self) -> SessionState {
        if self.authenticating.load(Ordering::Acquire) {
            return SessionState::Authenticating;
        }
        match &*self.session.read().await {
            None => SessionState::Unauthenticated,
            Some(session) if session.is_valid_at(Utc::now()) => SessionState::Authenticated {
                expires_at: session.expires_at,
            },
            Some(session) => SessionState::Expired {
                expired_at: session.expires_at,
            },
        }
    }

    /// Drop the in-memory session; the next call logs in again
    pub async fn invalidate(&self) {
        *self.session.write().await = None;
    }

    /// Drop the session both in memory and in the store
    pub async fn forget_session(&self) -> PiholeResult<()> {
        self.invalidate().await;
        self.store.remove(&self.store_key).await?;
        info!("Cleared cached session for {}", self.config.base_url);
        Ok(())
    }

    /// Probe the server. Never fails; errors are folded into the result.
    pub async fn test_connection(&self) -> ConnectionTestResult {
        match self
            .request::<Value>(&self.config.probe_path, RequestOptions::get())
            .await
        {
            Ok(body) => ConnectionTestResult::ok(extract_version(&body)),
            Err(e) => {
                // login failures are already logged by `login`
                debug!(error = %e, "Connection test failed");
                ConnectionTestResult::failed(e.to_string())
            }
        }
    }

    /// Ensure a session that is not within the refresh margin of expiry and
    /// return it.
    ///
    /// Concurrent callers share one network login and receive its outcome,
    /// the session it produced or the same failure, even when that session
    /// is already inside the refresh margin.
    pub async fn authenticate(&self) -> PiholeResult<Session> {
        if let Some(session) = self.fresh_session().await {
            return Ok(session);
        }

        let observed_epoch = self.auth_epoch.load(Ordering::Acquire);
        let mut ledger = self.auth_gate.lock().await;

        if self.auth_epoch.load(Ordering::Acquire) != observed_epoch {
            match &ledger.last_outcome {
                Some(Ok(session)) => {
                    debug!("Reusing session from a concurrent login");
                    return Ok(session.clone());
                }
                Some(Err(failure)) => {
                    debug!("Sharing failure of a concurrent login");
                    return Err(failure.replay());
                }
                None => {}
            }
        }
        if let Some(session) = self.fresh_session().await {
            return Ok(session);
        }

        let result = {
            let _guard = AuthenticatingGuard::enter(&self.authenticating);
            self.login().await
        };
        self.auth_epoch.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(session) => {
                ledger.last_outcome = Some(Ok(session.clone()));
                self.persist(&session).await;
                *self.session.write().await = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                *self.session.write().await = None;
                ledger.last_outcome = Some(Err(AuthFailure::from_error(&e)));
                Err(e)
            }
        }
    }

    /// Perform one logical authenticated call and decode the JSON body.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> PiholeResult<T> {
        if endpoint.trim().is_empty() {
            return Err(validation_error!(
                "Endpoint must not be empty",
                "endpoint",
                "session_client"
            ));
        }

        let mut attempt = RequestAttempt::first(endpoint, &options);
        loop {
            self.pacer.pace().await;
            let session = self.authenticate().await?;

            match self.execute(&session, &attempt).await? {
                AttemptOutcome::Success(body) => return decode_body(&body),
                AttemptOutcome::RateLimited {
                    message,
                    retry_after_ms,
                } => match attempt.retried(RetryReason::RateLimited) {
                    Some(next) => {
                        warn!(
                            endpoint,
                            backoff_ms = self.config.policy.rate_limit_backoff.as_millis() as u64,
                            "Rate limited, retrying once after backoff"
                        );
                        tokio::time::sleep(self.config.policy.rate_limit_backoff).await;
                        attempt = next;
                    }
                    None => {
                        return Err(PiholeError::RateLimited {
                            message,
                            retry_after_ms,
                            context: ErrorContext::new("session_client")
                                .with_operation("request")
                                .with_metadata("endpoint", endpoint)
                                .with_suggestion("Wait a moment before trying again"),
                        })
                    }
                },
                AttemptOutcome::Unauthorized { message } => {
                    self.invalidate_if_current(&session).await;
                    match attempt.retried(RetryReason::Unauthorized) {
                        Some(next) => {
                            info!(endpoint, "Session rejected, re-authenticating once");
                            attempt = next;
                        }
                        None => {
                            return Err(PiholeError::Unauthorized {
                                message,
                                context: ErrorContext::new("session_client")
                                    .with_operation("request")
                                    .with_metadata("endpoint", endpoint)
                                    .with_suggestion("Check the configured password"),
                            })
                        }
                    }
                }
            }
        }
    }

    async fn fresh_session(&self) -> Option<Session> {
        let now = Utc::now();
        self.session
            .read()
            .await
            .as_ref()
            .filter(|s| !s.needs_refresh(now, self.config.policy.refresh_margin))
            .cloned()
    }

    /// Clear the cached session only if it is still the one that was rejected
    async fn invalidate_if_current(&self, rejected: &Session) {
        let mut slot = self.session.write().await;
        if slot.as_ref().is_some_and(|s| s.sid == rejected.sid) {
            *slot = None;
        }
    }

    async fn persist(&self, session: &Session) {
        if let Err(e) = self.store.save(&self.store_key, &session.to_persisted()).await {
            warn!(error = %e, "Failed to persist session");
        }
    }

    async fn login(&self) -> PiholeResult<Session> {
        log_operation_start!("authenticate", base_url = %self.config.base_url);

        let result = self.login_inner().await;
        match &result {
            Ok(session) => {
                log_operation_success!("authenticate", expires_at = %session.expires_at);
            }
            Err(e) => {
                log_operation_error!("authenticate", e);
            }
        }
        result
    }

    async fn login_inner(&self) -> PiholeResult<Session> {
        let url = self.join_url(&self.config.login_path)?;
        let exchange = async {
            let response = self
                .http
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .json(&LoginRequest {
                    password: &self.config.password,
                })
                .send()
                .await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = with_timeout(
            exchange,
            self.config.timeout,
            "authenticate",
            LOGIN_TIMEOUT_MESSAGE,
        )
        .await?
        .map_err(|e| self.transport_error(e, "authenticate", LOGIN_TIMEOUT_MESSAGE))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PiholeError::AuthenticationRateLimited {
                message: LOGIN_RATE_LIMITED_MESSAGE.to_string(),
                context: ErrorContext::new("session_client")
                    .with_operation("authenticate")
                    .with_suggestion("Wait before logging in again"),
            });
        }

        if !status.is_success() {
            return Err(auth_failed(
                format!(
                    "Authentication failed: {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
                Some(status.as_u16()),
            ));
        }

        let parsed: LoginResponse = serde_json::from_slice(&body).map_err(|e| {
            auth_failed(
                format!("Malformed authentication response: {}", e),
                Some(status.as_u16()),
            )
        })?;
        let login = parsed.session;

        if !login.valid {
            if let Some(message) = login.message.as_deref().filter(|m| !m.is_empty()) {
                debug!(server_message = message, "Server rejected credentials");
            }
            return Err(auth_failed(
                INVALID_CREDENTIALS_MESSAGE.to_string(),
                Some(status.as_u16()),
            ));
        }

        let sid = login.sid.filter(|s| !s.is_empty()).ok_or_else(|| {
            auth_failed(
                "Authentication response did not include a session id".to_string(),
                Some(status.as_u16()),
            )
        })?;

        Ok(Session::from_login(
            sid,
            login.csrf.unwrap_or_default(),
            login.validity,
            self.config.policy.expiry_safety_factor,
            &self.config.base_url,
            Utc::now(),
        ))
    }

    async fn execute(
        &self,
        session: &Session,
        attempt: &RequestAttempt<'_>,
    ) -> PiholeResult<AttemptOutcome> {
        let options = attempt.options;
        let url = self.endpoint_url(attempt.endpoint, &session.sid)?;
        debug!(
            method = %options.method,
            endpoint = attempt.endpoint,
            attempt = attempt.number(),
            "Sending request"
        );

        let mut builder = self
            .http
            .request(options.method.clone(), url)
            .header(CONTENT_TYPE, "application/json");

        for (name, value) in &options.headers {
            let (name, value) = parse_header(name, value)?;
            builder = builder.header(name, value);
        }

        if is_mutating(&options.method) {
            let (name, value) = parse_header(&self.config.csrf_header, &session.csrf)?;
            builder = builder.header(name, value);
        }

        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let retry_after_ms = retry_after_ms(response.headers());
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, retry_after_ms, body))
        };

        let limit = options.timeout.unwrap_or(self.config.timeout);
        let (status, retry_after_ms, body) =
            with_timeout(exchange, limit, "request", REQUEST_TIMEOUT_MESSAGE)
                .await?
                .map_err(|e| self.transport_error(e, "request", REQUEST_TIMEOUT_MESSAGE))?;

        if status.is_success() {
            return Ok(AttemptOutcome::Success(body.to_vec()));
        }

        let message = extract_error_message(status, &body);
        match status {
            StatusCode::TOO_MANY_REQUESTS => Ok(AttemptOutcome::RateLimited {
                message,
                retry_after_ms,
            }),
            StatusCode::UNAUTHORIZED => Ok(AttemptOutcome::Unauthorized { message }),
            _ => Err(PiholeError::Server {
                status: status.as_u16(),
                message,
                context: ErrorContext::new("session_client")
                    .with_operation("request")
                    .with_metadata("endpoint", attempt.endpoint)
                    .with_metadata("method", options.method.as_str()),
            }),
        }
    }

    fn join_url(&self, path: &str) -> PiholeResult<Url> {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Url::parse(&format!("{}{}", self.config.base_url, path)).map_err(|e| {
            validation_error!(
                format!("Invalid endpoint '{}': {}", path, e),
                "endpoint",
                "session_client"
            )
        })
    }

    /// Endpoint URL with `sid` set (replacing any caller-supplied value)
    fn endpoint_url(&self, endpoint: &str, sid: &str) -> PiholeResult<Url> {
        let mut url = self.join_url(endpoint)?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "sid")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("sid", sid);
        Ok(url)
    }

    fn transport_error(&self, error: reqwest::Error, operation: &str, timeout_message: &str) -> PiholeError {
        if error.is_timeout() {
            return PiholeError::RequestTimeout {
                message: timeout_message.to_string(),
                operation: operation.to_string(),
                duration_ms: self.config.timeout.as_millis() as u64,
                context: ErrorContext::new("session_client").with_operation(operation),
            };
        }
        PiholeError::Network {
            message: format!("Failed to reach Pi-hole at {}: {}", self.config.base_url, error),
            source: Some(Box::new(error)),
            context: ErrorContext::new("session_client")
                .with_operation(operation)
                .with_suggestion("Check the Pi-hole URL and that the device is online"),
        }
    }
}

fn create_http_client(config: &ClientConfig) -> PiholeResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent).map_err(|e| PiholeError::Config {
            message: format!("Invalid user agent: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .connect_timeout(config.timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| PiholeError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })
}

fn auth_failed(message: String, status: Option<u16>) -> PiholeError {
    PiholeError::AuthenticationFailed {
        message,
        status,
        context: ErrorContext::new("session_client")
            .with_operation("authenticate")
            .with_suggestion("Check the configured password or application password"),
    }
}

fn parse_header(name: &str, value: &str) -> PiholeResult<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        validation_error!(format!("Invalid header name '{}': {}", name, e), "headers", "session_client")
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| {
        validation_error!(format!("Invalid value for header '{}': {}", name, e), "headers", "session_client")
    })?;
    Ok((header_name, header_value))
}

pub(crate) fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::DELETE | Method::PATCH
    )
}

fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|seconds| seconds.saturating_mul(1000))
}

/// Best-effort error message from a non-2xx body.
///
/// Understands `{"error": {"message", "hint"}}` and flat
/// `{"message"}` / `{"error": "..."}` envelopes; anything else falls back to
/// `HTTP {status}: {reason}`.
pub(crate) fn extract_error_message(status: StatusCode, body: &[u8]) -> String {
    let fallback = format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    );

    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
        return fallback;
    };

    match map.get("error") {
        Some(Value::Object(error)) => non_empty_str(error.get("message"))
            .or_else(|| non_empty_str(error.get("hint")))
            .unwrap_or("Unknown API error")
            .to_string(),
        other => non_empty_str(map.get("message"))
            .or_else(|| non_empty_str(other))
            .map(str::to_string)
            .unwrap_or(fallback),
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> PiholeResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(body)?)
}

fn extract_version(body: &Value) -> Option<String> {
    match body.get("version")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;
    use serde_json::json;

    async fn client(base_url: &str) -> SessionClient {
        SessionClient::new(
            ClientConfig::new(base_url, "secret"),
            Arc::new(MemorySessionStore::new()),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_error_envelope_nested() {
        let body = json!({"error": {"key": "bad_request", "message": "Invalid domain", "hint": "x"}});
        let msg = extract_error_message(StatusCode::BAD_REQUEST, body.to_string().as_bytes());
        assert_eq!(msg, "Invalid domain");

        let body = json!({"error": {"key": "bad_request", "hint": "Use a FQDN"}});
        let msg = extract_error_message(StatusCode::BAD_REQUEST, body.to_string().as_bytes());
        assert_eq!(msg, "Use a FQDN");

        let body = json!({"error": {"key": "bad_request"}});
        let msg = extract_error_message(StatusCode::BAD_REQUEST, body.to_string().as_bytes());
        assert_eq!(msg, "Unknown API error");
    }

    #[test]
    fn test_error_envelope_flat() {
        let body = json!({"message": "Something broke"});
        let msg = extract_error_message(StatusCode::INTERNAL_SERVER_ERROR, body.to_string().as_bytes());
        assert_eq!(msg, "Something broke");

        let body = json!({"error": "Forbidden here"});
        let msg = extract_error_message(StatusCode::FORBIDDEN, body.to_string().as_bytes());
        assert_eq!(msg, "Forbidden here");

        let body = json!({"status": "nope"});
        let msg = extract_error_message(StatusCode::FORBIDDEN, body.to_string().as_bytes());
        assert_eq!(msg, "HTTP 403: Forbidden");
    }

    #[test]
    fn test_error_envelope_unparseable() {
        let msg = extract_error_message(StatusCode::INTERNAL_SERVER_ERROR, b"<html>oops</html>");
        assert_eq!(msg, "HTTP 500: Internal Server Error");
        let msg = extract_error_message(StatusCode::BAD_GATEWAY, b"");
        assert_eq!(msg, "HTTP 502: Bad Gateway");
    }

    #[test]
    fn test_mutating_methods() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::PUT));
        assert!(is_mutating(&Method::DELETE));
        assert!(is_mutating(&Method::PATCH));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
    }

    #[test]
    fn test_attempt_allows_one_retry() {
        let options = RequestOptions::get();
        let first = RequestAttempt::first("/api/stats/summary", &options);
        assert_eq!(first.number(), 1);

        let second = first.retried(RetryReason::Unauthorized).unwrap();
        assert_eq!(second.number(), 2);
        assert_eq!(second.retry, Some(RetryReason::Unauthorized));

        assert!(second.retried(RetryReason::RateLimited).is_none());
        assert!(second.retried(RetryReason::Unauthorized).is_none());
    }

    #[test]
    fn test_decode_empty_body() {
        let _: () = decode_body(b"").unwrap();
        let value: Value = decode_body(b"  ").unwrap();
        assert_eq!(value, Value::Null);
        let parsed: Value = decode_body(br#"{"queries":{"total":100}}"#).unwrap();
        assert_eq!(parsed["queries"]["total"], 100);
    }

    #[test]
    fn test_retry_after_header() {
        let headers = |value: &str| {
            let mut map = HeaderMap::new();
            map.insert(reqwest::header::RETRY_AFTER, HeaderValue::from_str(value).unwrap());
            map
        };
        assert_eq!(retry_after_ms(&headers(" 3 ")), Some(3_000));
        assert_eq!(retry_after_ms(&headers("18446744073709551615")), Some(u64::MAX));
        assert_eq!(retry_after_ms(&headers("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(retry_after_ms(&HeaderMap::new()), None);
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version(&json!({"version": "v6.0"})), Some("v6.0".to_string()));
        assert_eq!(extract_version(&json!({"version": 6})), Some("6".to_string()));
        assert_eq!(extract_version(&json!({"queries": {}})), None);
    }

    #[tokio::test]
    async fn test_endpoint_url_sets_sid() {
        let client = client("https://pi.example.local/").await;
        assert_eq!(client.base_url(), "https://pi.example.local");

        let url = client.endpoint_url("/api/stats/summary", "S1").unwrap();
        assert_eq!(url.as_str(), "https://pi.example.local/api/stats/summary?sid=S1");

        let url = client
            .endpoint_url("/api/queries?domain=example.com&limit=1&sid=old", "S2")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://pi.example.local/api/queries?domain=example.com&limit=1&sid=S2"
        );

        let url = client.endpoint_url("api/dns/blocking", "S3").unwrap();
        assert_eq!(url.path(), "/api/dns/blocking");
    }

    #[tokio::test]
    async fn test_invalid_base_url_rejected() {
        let result = SessionClient::new(
            ClientConfig::new("   ", "secret"),
            Arc::new(MemorySessionStore::new()),
        )
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_empty_endpoint_rejected_without_network() {
        let client = client("http://127.0.0.1:9").await;
        let err = client.request::<Value>("  ", RequestOptions::get()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(client.state().await, SessionState::Unauthenticated);
    }

    #[test]
    fn test_auth_failure_replay_keeps_kind_and_message() {
        let original = PiholeError::AuthenticationRateLimited {
            message: LOGIN_RATE_LIMITED_MESSAGE.to_string(),
            context: ErrorContext::new("test"),
        };
        let replayed = AuthFailure::from_error(&original).replay();
        assert_eq!(replayed.kind(), ErrorKind::AuthenticationRateLimited);
        assert_eq!(replayed.to_string(), original.to_string());

        let original = auth_failed(INVALID_CREDENTIALS_MESSAGE.to_string(), Some(200));
        let replayed = AuthFailure::from_error(&original).replay();
        assert_eq!(replayed.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(replayed.to_string(), INVALID_CREDENTIALS_MESSAGE);
    }

    #[test]
    fn test_client_config_debug_hides_password() {
        let config = ClientConfig::new("http://pi.hole", "hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
