//! In-process mock Pi-hole for integration tests
//!
//! Binds an axum server to `127.0.0.1:0`. Login replies and API replies are
//! scripted; every API request is recorded so tests can assert on the sid,
//! CSRF header and body that reached the server.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use pihole_api::{ClientConfig, SessionClient, SessionPolicy};
use pihole_core::SessionStore;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
});

pub const TEST_PASSWORD: &str = "secret";

/// A scripted HTTP reply
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body.to_string()),
            headers: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: None,
            headers: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: Some(body.to_string()),
            headers: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn login(sid: &str, csrf: &str, validity: f64) -> Self {
        Self::ok(json!({
            "session": {"valid": true, "sid": sid, "csrf": csrf, "validity": validity, "message": ""}
        }))
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap();
        let mut response = match self.body {
            Some(body) => (status, [("content-type", "application/json")], body).into_response(),
            None => status.into_response(),
        };
        for (name, value) in self.headers {
            response.headers_mut().insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(&value).unwrap(),
            );
        }
        response
    }
}

/// An API request as seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub sid: Option<String>,
    pub query: Vec<(String, String)>,
    pub csrf: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct MockState {
    login_replies: Mutex<VecDeque<Reply>>,
    login_delay: Mutex<Duration>,
    api_replies: Mutex<VecDeque<Reply>>,
    path_replies: Mutex<HashMap<String, Reply>>,
    login_hits: AtomicUsize,
    login_bodies: Mutex<Vec<Value>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct MockPihole {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockPihole {
    pub async fn spawn() -> Self {
        LazyLock::force(&TRACING);

        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/auth", post(login_handler))
            .fallback(api_handler)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
        }
    }

    /// Next login reply; when none is queued the mock issues `S<n>`/`C<n>`
    /// valid for 600s
    pub fn push_login(&self, reply: Reply) {
        self.state.login_replies.lock().unwrap().push_back(reply);
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *self.state.login_delay.lock().unwrap() = delay;
    }

    /// Next API reply regardless of path
    pub fn push_reply(&self, reply: Reply) {
        self.state.api_replies.lock().unwrap().push_back(reply);
    }

    /// Standing reply for a path, used when the queue is empty
    pub fn reply_on(&self, path: &str, reply: Reply) {
        self.state
            .path_replies
            .lock()
            .unwrap()
            .insert(path.to_string(), reply);
    }

    pub fn login_hits(&self) -> usize {
        self.state.login_hits.load(Ordering::SeqCst)
    }

    pub fn login_bodies(&self) -> Vec<Value> {
        self.state.login_bodies.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn api_hits(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Client with short timings so retries and pacing stay fast
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.base_url, TEST_PASSWORD)
            .with_timeout(Duration::from_secs(2))
            .with_policy(test_policy())
    }

    pub async fn client(&self, store: Arc<dyn SessionStore>) -> SessionClient {
        SessionClient::new(self.client_config(), store)
            .await
            .expect("Failed to create client")
    }
}

pub fn test_policy() -> SessionPolicy {
    SessionPolicy {
        request_spacing: Duration::from_millis(5),
        rate_limit_backoff: Duration::from_millis(50),
        ..SessionPolicy::default()
    }
}

pub fn summary_body() -> Value {
    json!({"queries": {"total": 100}})
}

async fn login_handler(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let n = state.login_hits.fetch_add(1, Ordering::SeqCst) + 1;
    if let Ok(value) = serde_json::from_slice::<Value>(&body) {
        state.login_bodies.lock().unwrap().push(value);
    }

    let delay = *state.login_delay.lock().unwrap();
    let reply = state
        .login_replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Reply::login(&format!("S{}", n), &format!("C{}", n), 600.0));

    tokio::time::sleep(delay + reply.delay).await;
    reply.into_response()
}

async fn api_handler(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query: Vec<(String, String)> = uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();
    let sid = query
        .iter()
        .find(|(key, _)| key == "sid")
        .map(|(_, value)| value.clone());

    state.requests.lock().unwrap().push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        sid,
        query,
        csrf: headers
            .get("x-pi-hole-csrf")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).ok(),
    });

    let queued = state.api_replies.lock().unwrap().pop_front();
    let reply = queued
        .or_else(|| state.path_replies.lock().unwrap().get(uri.path()).cloned())
        .unwrap_or_else(|| Reply::ok(summary_body()));

    tokio::time::sleep(reply.delay).await;
    reply.into_response()
}
