//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::EncoreError;

/// Wrap a fallible future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, EncoreError>>,
) -> Result<T, EncoreError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(EncoreError::Timeout(duration.as_millis() as u64)),
    }
}
