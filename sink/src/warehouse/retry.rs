use std::future::Future;

use tracing::warn;

use crate::error::{ErrorKind, SinkError, SinkResult};

/// One retry after a refresh, never more.
pub(crate) const MAX_ATTEMPTS: u32 = 2;

/// Returns whether an error indicates that the session credentials lapsed.
pub(crate) fn is_auth_expiry(error: &SinkError) -> bool {
    error.kind() == ErrorKind::AuthenticationExpired
}

/// Runs `operation`, refreshing and retrying when `should_retry` matches.
///
/// The refresh runs at most `max_attempts - 1` times; an error on the final
/// attempt is returned as-is, and a failing refresh aborts immediately.
pub(crate) async fn with_refresh<T, Fut, RFut>(
    max_attempts: u32,
    should_retry: impl Fn(&SinkError) -> bool,
    refresh: impl Fn() -> RFut,
    operation: impl Fn() -> Fut,
) -> SinkResult<T>
where
    Fut: Future<Output = SinkResult<T>>,
    RFut: Future<Output = SinkResult<()>>,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Err(error) if attempt < max_attempts && should_retry(&error) => {
                warn!(%error, attempt, "statement failed, refreshing warehouse session");
                refresh().await?;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::sink_error;

    fn auth_error() -> SinkError {
        sink_error!(ErrorKind::AuthenticationExpired, "Authentication token has expired")
    }

    #[tokio::test]
    async fn retries_once_after_refresh() {
        let calls = AtomicU32::new(0);
        let refreshes = AtomicU32::new(0);

        let result = with_refresh(
            MAX_ATTEMPTS,
            is_auth_expiry,
            || async {
                refreshes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(auth_error())
                } else {
                    Ok(42)
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_failure_is_fatal() {
        let calls = AtomicU32::new(0);

        let result: SinkResult<u32> = with_refresh(
            MAX_ATTEMPTS,
            is_auth_expiry,
            || async { Ok(()) },
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(auth_error())
            },
        )
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::AuthenticationExpired);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_matching_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: SinkResult<u32> = with_refresh(
            MAX_ATTEMPTS,
            is_auth_expiry,
            || async { Ok(()) },
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(sink_error!(
                    ErrorKind::WarehouseQueryFailed,
                    "Statement failed"
                ))
            },
        )
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::WarehouseQueryFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
