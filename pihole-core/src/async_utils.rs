//! Async helpers shared by the client: bounded waits and request pacing

use crate::error::{ErrorContext, PiholeError, PiholeResult};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Run `future` under a deadline.
///
/// On expiry the future is dropped (which cancels the in-flight I/O) and a
/// `RequestTimeout` carrying `message` is returned.
pub async fn with_timeout<F, T>(
    future: F,
    limit: Duration,
    operation_name: &str,
    message: &str,
) -> PiholeResult<T>
where
    F: std::future::Future<Output = T>,
{
    match timeout(limit, future).await {
        Ok(result) => Ok(result),
        Err(_) => {
            let duration_ms = limit.as_millis() as u64;
            warn!(operation = operation_name, duration_ms, "Operation timed out");
            Err(PiholeError::RequestTimeout {
                message: message.to_string(),
                operation: operation_name.to_string(),
                duration_ms,
                context: ErrorContext::new("async_utils")
                    .with_operation(operation_name)
                    .with_metadata("timeout_ms", &duration_ms.to_string())
                    .with_suggestion("Increase the connection timeout")
                    .with_suggestion("Check that the Pi-hole is reachable"),
            })
        }
    }
}

/// Fixed pause inserted before each outbound request. Every call waits the
/// same amount regardless of recent traffic.
#[derive(Debug, Clone, Copy)]
pub struct RequestPacer {
    spacing: Duration,
}

impl RequestPacer {
    pub fn new(spacing: Duration) -> Self {
        Self { spacing }
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    pub async fn pace(&self) {
        if self.spacing.is_zero() {
            return;
        }
        debug!(sleep_ms = self.spacing.as_millis() as u64, "Pacing request");
        sleep(self.spacing).await;
    }
}
