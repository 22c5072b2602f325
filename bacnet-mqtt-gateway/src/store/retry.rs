//! Exponential backoff retry wrapper for store operations.
//!
//! Mirrors `with_db_retry` in the original `sqlmodel_client.py`: up to
//! `MAX_ATTEMPTS` tries, `base * 2^attempt` delay between them, only for
//! errors `StoreError::classify` marks retryable.

use crate::error::StoreError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const MAX_ATTEMPTS: u32 = 3;
pub const BASE_DELAY_MS: u64 = 100;

pub async fn with_db_retry<T, F, Fut>(operation: &str, mut f: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let classified = StoreError::classify(&e);
                if !classified.is_retryable() || attempt + 1 >= MAX_ATTEMPTS {
                    return Err(classified);
                }
                let delay = BASE_DELAY_MS * 2u64.pow(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay,
                    error = %classified,
                    "store operation failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StoreError> = with_db_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42u32) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_on_retryable_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StoreError> = with_db_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::PoolTimedOut) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, StoreError> = with_db_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::RowNotFound) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
