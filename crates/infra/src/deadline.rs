//! Operation deadlines.

use std::future::Future;
use std::time::Duration;

use crate::error::OrderingError;

/// Run `fut` under `deadline`, if there is one.
///
/// On expiry the future is dropped, and with it any transaction it owns, so
/// the unit rolls back and the caller gets a retryable timeout.
pub(crate) async fn within<T, F>(
    deadline: Option<Duration>,
    operation: &'static str,
    fut: F,
) -> Result<T, OrderingError>
where
    F: Future<Output = Result<T, OrderingError>>,
{
    let Some(deadline) = deadline else {
        return fut.await;
    };

    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                deadline_ms = deadline.as_millis() as u64,
                "operation deadline expired; unit rolled back"
            );
            Err(OrderingError::timeout(operation))
        }
    }
}
