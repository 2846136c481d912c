//! Pi-hole API client
//!
//! [`SessionClient`] handles login, session reuse across processes, and the
//! retry rules for rate limiting and rejected sessions. [`PiHoleApi`] layers
//! the Pi-hole v6 endpoints on top of it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pihole_api::{ClientConfig, FileSessionStore, PiHoleApi, SessionClient};
//!
//! # async fn run() -> pihole_core::PiholeResult<()> {
//! let store = Arc::new(FileSessionStore::new(pihole_core::default_cache_dir()));
//! let client = SessionClient::new(ClientConfig::new("http://pi.hole", "secret"), store).await?;
//! let api = PiHoleApi::new(client);
//! println!("{}", api.get_status().await?.blocking);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod pihole;
pub mod session;
pub mod store;
pub mod types;

pub use client::{ClientConfig, RequestAttempt, RequestOptions, RetryReason, SessionClient};
pub use pihole::{PiHoleApi, DEFAULT_RECENT_QUERY_COUNT};
pub use session::{session_store_key, Session, SessionPolicy, SessionState};
pub use store::{FileSessionStore, MemorySessionStore};
pub use types::*;

pub use reqwest::Method;
