//! 日志原语暂时不可用时的重试策略
//!
//! 只有 `StreamError::is_transient()` 为真的错误才会重试；其余错误原样返回。
//! 重试期间不产生任何簿记副作用：调用方在拿到成功结果之前不会推进游标或登记待确认条目。
//!
use crate::error::StreamResult;
use bon::Builder;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// 指数退避策略
#[derive(Builder, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次），最小为 1
    #[builder(default = 3)]
    pub max_attempts: u32,
    #[builder(default = Duration::from_millis(50))]
    pub initial_backoff: Duration,
    #[builder(default = Duration::from_secs(1))]
    pub max_backoff: Duration,
    #[builder(default = 2)]
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// 只尝试一次
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 第 `attempt` 次失败（从 1 开始）之后的等待时长
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// 按策略执行异步操作，遇到暂时性错误时退避重试
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut f: F) -> StreamResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StreamResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let backoff = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Retrying log operation"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(200));
        assert_eq!(policy.backoff(30), Duration::from_secs(1));
    }

    #[test]
    fn builder_defaults_match_default() {
        assert_eq!(RetryPolicy::builder().build(), RetryPolicy::default());
        assert_eq!(
            RetryPolicy::builder().max_attempts(5).build().max_attempts,
            5
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let value = retry(&RetryPolicy::default(), "tail", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StreamError::log_unavailable("down"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = retry(&RetryPolicy::default(), "append", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(StreamError::log_unavailable("down")) }
        })
        .await
        .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::builder().max_attempts(10).build();
        let err = retry(&policy, "fetch", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(StreamError::invalid_argument("bad")) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StreamError::InvalidArgument { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }
}
