//! Bounded calls into the payment provider.

use std::future::Future;
use std::time::Duration;

use crate::domain::entitlement::EntitlementError;
use crate::ports::PaymentError;

/// Default bound for provider calls made by handlers.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Awaits `call` for at most `timeout`.
///
/// Timeouts and provider failures both become `EntitlementError::Upstream`.
pub(crate) async fn bounded<T, F>(
    timeout: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, EntitlementError>
where
    F: Future<Output = Result<T, PaymentError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            tracing::warn!(operation, code = %err.code, error = %err.message, "Payment provider call failed");
            Err(EntitlementError::upstream(err.message))
        }
        Err(_) => {
            tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "Payment provider call timed out");
            Err(EntitlementError::upstream(format!(
                "{} timed out after {:?}",
                operation, timeout
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_values_through() {
        let value = bounded(Duration::from_secs(1), "op", async { Ok::<_, PaymentError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn provider_errors_become_upstream() {
        let err = bounded(Duration::from_secs(1), "op", async {
            Err::<(), _>(PaymentError::network("connection reset"))
        })
        .await
        .unwrap_err();
        assert_eq!(err, EntitlementError::upstream("connection reset"));
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let err = bounded(Duration::from_millis(10), "get_subscription", async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, PaymentError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EntitlementError::Upstream(ref msg) if msg.contains("timed out")));
    }
}
