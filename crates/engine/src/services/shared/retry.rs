use backoff::{future::retry, ExponentialBackoffBuilder};
use std::{future::Future, time::Duration};
use tracing::warn;
use utils::AppResult;

/// 临时存储错误的有界重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: base_delay.saturating_mul(20),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// 执行 `operation`，遇到 [`AppError::is_transient`](utils::AppError::is_transient) 的错误时指数退避重试，
/// 最多尝试 `max_attempts` 次；不可重试的错误立即返回。
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, name: &str, mut operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.base_delay)
        .with_max_interval(policy.max_delay)
        .with_max_elapsed_time(None)
        .build();

    retry(backoff, || {
        attempt += 1;
        let current = attempt;
        let fut = operation();
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_transient() && current < max_attempts => {
                    warn!("🔁 {} 第{}次失败，准备重试: {}", name, current, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use utils::AppError;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);

        let result = retry_transient(&fast_policy(3), "flaky", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(AppError::VersionConflict("busy".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);

        let result: AppResult<()> = retry_transient(&fast_policy(2), "always busy", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::VersionConflict("busy".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::VersionConflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);

        let result: AppResult<()> = retry_transient(&fast_policy(5), "broken", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::NotFound("gone".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
