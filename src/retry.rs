// ABOUTME: Bounded fixed-delay retry and per-batch wall-clock timeout
// ABOUTME: Wraps destination calls so transient failures are retried locally

use crate::error::{DestinationError, MigrationError, Result};
use std::future::Future;
use std::time::Duration;

/// Retry and timeout budget applied to destination writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub batch_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration, batch_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            batch_timeout,
        }
    }

    /// Run a destination operation, retrying transient failures
    ///
    /// Waits `retry_delay` between failed attempts (never after the last one).
    /// A transient failure on the final attempt becomes `OperationFailed`; a
    /// permanent rejection is returned immediately as `Destination`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use supabase_table_migrator::retry::RetryPolicy;
    /// # use supabase_table_migrator::error::DestinationError;
    /// # async fn example() -> supabase_table_migrator::error::Result<()> {
    /// let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(1));
    /// let value = policy
    ///     .run("ping", || async { Ok::<_, DestinationError>(42) })
    ///     .await?;
    /// assert_eq!(value, 42);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, DestinationError>>,
    {
        let mut attempt = 1;
        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => {
                    return Err(MigrationError::Destination {
                        operation: operation.to_string(),
                        source: err,
                    });
                }
                Err(err) if attempt >= self.max_attempts => {
                    return Err(MigrationError::OperationFailed {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Operation failed, retrying in {:?}",
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Bound a whole batch (including its retries) by `batch_timeout`
    ///
    /// The batch future is dropped when the deadline passes. A request already
    /// sent to the destination may still be applied there.
    pub async fn within_batch_timeout<T, Fut>(&self, table: &str, offset: u64, batch: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.batch_timeout, batch).await {
            Ok(result) => result,
            Err(_) => Err(MigrationError::BatchTimeout {
                table: table.to_string(),
                offset,
                timeout: self.batch_timeout,
            }),
        }
    }
}
