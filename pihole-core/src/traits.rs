//! Core trait definitions

use crate::error::PiholeResult;
use crate::types::PersistedSession;
use async_trait::async_trait;

/// Durable key-value store for sessions.
///
/// Keys are derived from the base URL so one store can hold sessions for
/// several Pi-hole instances. `load` returns `Ok(None)` for missing entries.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &str) -> PiholeResult<Option<PersistedSession>>;

    async fn save(&self, key: &str, session: &PersistedSession) -> PiholeResult<()>;

    async fn remove(&self, key: &str) -> PiholeResult<()>;
}
