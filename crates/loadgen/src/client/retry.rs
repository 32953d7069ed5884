//! Bounded retries for chain queries.

use std::future::Future;

use backon::Retryable;

use super::{ChainError, ChainResult};
use crate::config::RetryPolicy;

/// Runs `query` under `policy`.
///
/// Every attempt is bounded by the policy's per-attempt timeout. Retryable
/// failures are retried after a fixed delay until the retry budget is spent,
/// at which point the last error is returned.
pub async fn with_retry<T, F, Fut>(
    op: &'static str,
    policy: &RetryPolicy,
    mut query: F,
) -> ChainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ChainResult<T>>,
{
    let attempt_timeout = policy.attempt_timeout;

    (|| {
        let attempt = query();
        async move {
            tokio::time::timeout(attempt_timeout, attempt)
                .await
                .map_err(|_| ChainError::Timeout(attempt_timeout))?
        }
    })
    .retry(policy.to_backoff_builder())
    .when(|e| e.is_retryable())
    .notify(|err, dur| {
        tracing::debug!(error = %err, delay = ?dur, op, "Retrying chain query");
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;

    fn policy(retries: usize) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::from_secs(3),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result = with_retry("balance", &policy(1), || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ChainError::Transport("connection reset".into()))
                } else {
                    Ok(7u64)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted_returns_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result: ChainResult<u64> = with_retry("nonce", &policy(1), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ChainError::Transport("unreachable".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(ChainError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result: ChainResult<u64> = with_retry("fees", &policy(3), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ChainError::Rejected { code: -32601, message: "method not found".into() })
            }
        })
        .await;

        assert!(matches!(result, Err(ChainError::Rejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let result: ChainResult<u64> = with_retry("call", &policy(0), || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await;

        assert!(matches!(result, Err(ChainError::Timeout(d)) if d == Duration::from_secs(5)));
    }
}
