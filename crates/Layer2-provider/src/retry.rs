//! Retry logic with exponential backoff
//!
//! 스트림이 시작되기 전(연결/상태 코드 단계)에만 적용된다.
//! 텍스트가 한 번이라도 방출된 뒤에는 재시도하지 않는다.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 8000,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// 0부터 시작하는 시도 번호의 대기 시간
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(base.min(self.max_delay_ms as f64) as u64)
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClassification {
    Retry,
    NoRetry,
    /// 제공자가 알려준 대기 시간이 있으면 그것을 따른다
    RateLimited { retry_after_ms: Option<u64> },
}

pub trait RetryableError {
    fn classify(&self) -> RetryClassification;
}

/// 재시도 가능한 에러면 backoff 후 다시 실행
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, operation_name: &str, mut operation: F) -> Result<T, E>
where
    E: RetryableError + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        let classification = err.classify();
        if classification == RetryClassification::NoRetry {
            debug!("{}: non-retryable error on attempt {}: {}", operation_name, attempt + 1, err);
            return Err(err);
        }
        if attempt >= config.max_retries {
            warn!("{}: giving up after {} retries: {}", operation_name, config.max_retries, err);
            return Err(err);
        }

        let delay = match classification {
            RetryClassification::RateLimited {
                retry_after_ms: Some(ms),
            } => Duration::from_millis(ms),
            _ => config.delay_for_attempt(attempt),
        };
        warn!(
            "{}: attempt {} failed, retrying in {:?}: {}",
            operation_name,
            attempt + 1,
            delay,
            err
        );
        sleep(delay).await;
        attempt += 1;
    }
}
