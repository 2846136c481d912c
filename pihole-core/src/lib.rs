//! Pi-hole Core - shared infrastructure for the Pi-hole client crates
//!
//! Errors, configuration, logging, async helpers and the session store
//! abstraction used by `pihole-api` and `pihole-cli`.

pub mod async_utils;
pub mod config;
pub mod duration;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use duration::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tracing;
