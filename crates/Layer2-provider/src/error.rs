//! Provider-specific error types
//!
//! ProviderError는 모델 엔드포인트 관련 세부 에러를 관리합니다.
//! 턴 루프로 올라갈 때는 `skein_foundation::Error::Model`로 변환되며,
//! 메시지는 그대로(verbatim) 보존됩니다.

use crate::retry::{RetryClassification, RetryableError};
use skein_foundation::Error as FoundationError;
use thiserror::Error;

/// Errors that can occur while streaming a completion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// API key is missing or rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded{}", .retry_after_ms.map(|ms| format!(", retry after {}ms", ms)).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Context length exceeded: {0}")]
    ContextLengthExceeded(String),

    /// Server error (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Connection failed, DNS, etc.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Body stream broke after the response started
    #[error("Stream error: {0}")]
    Stream(String),

    /// Endpoint or credentials not configured
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl RetryableError for ProviderError {
    fn classify(&self) -> RetryClassification {
        match self {
            ProviderError::RateLimited { retry_after_ms } => RetryClassification::RateLimited {
                retry_after_ms: *retry_after_ms,
            },

            // 연결 단계의 일시적 오류만 재시도
            ProviderError::ServerError(_) | ProviderError::Network(_) => RetryClassification::Retry,

            ProviderError::Authentication(_)
            | ProviderError::ContextLengthExceeded(_)
            | ProviderError::InvalidRequest(_)
            | ProviderError::InvalidResponse(_)
            | ProviderError::Stream(_)
            | ProviderError::NotConfigured(_)
            | ProviderError::Unknown(_) => RetryClassification::NoRetry,
        }
    }
}

impl ProviderError {
    /// HTTP 상태 코드와 본문으로 분류
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => ProviderError::Authentication(body.to_string()),
            429 => ProviderError::RateLimited {
                retry_after_ms: extract_retry_after(body),
            },
            400 => {
                if body.contains("context") || body.contains("too long") {
                    ProviderError::ContextLengthExceeded(body.to_string())
                } else {
                    ProviderError::InvalidRequest(body.to_string())
                }
            }
            500..=599 => ProviderError::ServerError(body.to_string()),
            _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
        }
    }
}

/// 에러 본문에서 retry_after 추출 (밀리초)
fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("error")
        .and_then(|e| e.get("retry_after"))
        .and_then(|v| v.as_f64())
        .map(|secs| (secs * 1000.0) as u64)
}

// ============================================================================
// skein_foundation::Error 변환
// ============================================================================

impl From<ProviderError> for FoundationError {
    fn from(err: ProviderError) -> Self {
        FoundationError::Model(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        assert!(matches!(
            ProviderError::from_http_status(401, "bad key"),
            ProviderError::Authentication(_)
        ));
        assert_eq!(
            ProviderError::from_http_status(429, r#"{"error":{"retry_after":1.5}}"#),
            ProviderError::RateLimited {
                retry_after_ms: Some(1500)
            }
        );
        assert!(matches!(
            ProviderError::from_http_status(400, "maximum context length"),
            ProviderError::ContextLengthExceeded(_)
        ));
        assert!(matches!(
            ProviderError::from_http_status(503, "overloaded"),
            ProviderError::ServerError(_)
        ));
    }

    #[test]
    fn test_model_error_is_verbatim() {
        let err: FoundationError = ProviderError::ServerError("upstream exploded".into()).into();
        assert!(err.is_run_fatal());
        match err {
            FoundationError::Model(msg) => assert_eq!(msg, "Server error: upstream exploded"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_only_transient_errors_retry() {
        assert_eq!(
            ProviderError::Network("reset".into()).classify(),
            RetryClassification::Retry
        );
        assert_eq!(
            ProviderError::Stream("eof".into()).classify(),
            RetryClassification::NoRetry
        );
    }
}
