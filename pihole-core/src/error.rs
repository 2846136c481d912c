//! Unified error handling
//!
//! Every failure path of the client ends up here. Client-facing variants
//! display their message verbatim so a front end can show it as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type PiholeResult<T> = Result<T, PiholeError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Coarse classification of a [`PiholeError`], convenient for matching in
/// callers that do not care about the attached context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthenticationFailed,
    AuthenticationRateLimited,
    RequestTimeout,
    Unauthorized,
    RateLimited,
    Server,
    Network,
    Config,
    Validation,
    Storage,
    Io,
    Serialization,
    Internal,
}

/// Main error type for the Pi-hole client
#[derive(Error, Debug)]
pub enum PiholeError {
    /// Login rejected, invalid credentials, or a malformed auth response
    #[error("{message}")]
    AuthenticationFailed {
        message: String,
        status: Option<u16>,
        context: ErrorContext,
    },

    /// Login attempted too frequently
    #[error("{message}")]
    AuthenticationRateLimited {
        message: String,
        context: ErrorContext,
    },

    #[error("{message}")]
    RequestTimeout {
        message: String,
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    /// 401 after the re-authentication retry was spent
    #[error("{message}")]
    Unauthorized {
        message: String,
        context: ErrorContext,
    },

    /// 429 after the backoff retry was spent
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
        context: ErrorContext,
    },

    /// Any other non-2xx response
    #[error("{message}")]
    Server {
        status: u16,
        message: String,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl PiholeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PiholeError::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            PiholeError::AuthenticationRateLimited { .. } => ErrorKind::AuthenticationRateLimited,
            PiholeError::RequestTimeout { .. } => ErrorKind::RequestTimeout,
            PiholeError::Unauthorized { .. } => ErrorKind::Unauthorized,
            PiholeError::RateLimited { .. } => ErrorKind::RateLimited,
            PiholeError::Server { .. } => ErrorKind::Server,
            PiholeError::Network { .. } => ErrorKind::Network,
            PiholeError::Config { .. } => ErrorKind::Config,
            PiholeError::Validation { .. } => ErrorKind::Validation,
            PiholeError::Storage { .. } => ErrorKind::Storage,
            PiholeError::Io(_) => ErrorKind::Io,
            PiholeError::Serialization(_) => ErrorKind::Serialization,
            PiholeError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            PiholeError::AuthenticationFailed { context, .. } => Some(context),
            PiholeError::AuthenticationRateLimited { context, .. } => Some(context),
            PiholeError::RequestTimeout { context, .. } => Some(context),
            PiholeError::Unauthorized { context, .. } => Some(context),
            PiholeError::RateLimited { context, .. } => Some(context),
            PiholeError::Server { context, .. } => Some(context),
            PiholeError::Network { context, .. } => Some(context),
            PiholeError::Config { context, .. } => Some(context),
            PiholeError::Validation { context, .. } => Some(context),
            PiholeError::Storage { context, .. } => Some(context),
            PiholeError::Internal { context, .. } => Some(context),
            PiholeError::Io(_) | PiholeError::Serialization(_) => None,
        }
    }

    /// HTTP status carried by the error, if the server produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            PiholeError::AuthenticationFailed { status, .. } => *status,
            PiholeError::AuthenticationRateLimited { .. } | PiholeError::RateLimited { .. } => {
                Some(429)
            }
            PiholeError::Unauthorized { .. } => Some(401),
            PiholeError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            PiholeError::Network { .. } => true,
            PiholeError::RequestTimeout { .. } => true,
            PiholeError::RateLimited { .. } => true,
            PiholeError::AuthenticationRateLimited { .. } => true,
            PiholeError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get retry delay in milliseconds for recoverable errors
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            PiholeError::Network { .. } => Some(1000),
            PiholeError::RequestTimeout { .. } => Some(2000),
            PiholeError::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            PiholeError::AuthenticationRateLimited { .. } => Some(5000),
            PiholeError::Server { status, .. } if *status >= 500 => Some(1000),
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        match self {
            PiholeError::Internal { .. } | PiholeError::Storage { .. } => {
                error!(error_id = ?error_id, error = %self, "Internal error occurred");
            }
            PiholeError::Config { .. } | PiholeError::Validation { .. } => {
                error!(error_id = ?error_id, error = %self, "Configuration or validation error");
            }
            PiholeError::Network { .. }
            | PiholeError::RequestTimeout { .. }
            | PiholeError::RateLimited { .. }
            | PiholeError::AuthenticationRateLimited { .. } => {
                warn!(
                    error_id = ?error_id,
                    error = %self,
                    "Network, timeout or rate limit error (may be recoverable)"
                );
            }
            _ => {
                error!(error_id = ?error_id, error = %self, "Error occurred");
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::PiholeError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'pihole config --init' to create a default config"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::PiholeError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::PiholeError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::PiholeError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}
