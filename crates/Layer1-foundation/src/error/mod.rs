//! Error types for skein
//!
//! 모든 에러를 중앙에서 관리
//!
//! 도구 수준 에러(`UnknownTool`, `Validation`, `ToolExecution`, `Timeout`)는
//! 실행 엔진에서 실패한 `ToolResult`로 복구되고, 런 치명 에러
//! (`Parse`, `TurnLimitExceeded`, `Model`)는 런을 `failed`로 전이시킨다.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// skein 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 호출 파싱 / 도구 관련
    // ========================================================================
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tool execution failed: {tool} - {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    // ========================================================================
    // 런 관련
    // ========================================================================
    #[error("Turn limit exceeded after {max_turns} turns")]
    TurnLimitExceeded { max_turns: u32 },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Thread {0} is held by an active run")]
    ThreadBusy(String),

    #[error("Invalid run transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // ========================================================================
    // 스트림 릴레이
    // ========================================================================
    #[error("Stream overflow on run {run_id}: events after seq {missed_after} were dropped")]
    StreamOverflow { run_id: String, missed_after: u64 },

    // ========================================================================
    // 게이트웨이 (MCP)
    // ========================================================================
    #[error("Gateway provider '{provider}' unavailable: {reason}")]
    GatewayUnavailable { provider: String, reason: String },

    #[error("MCP error: {0}")]
    Mcp(String),

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 런 전체를 실패시키는 에러인지 확인
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Error::Parse(_) | Error::TurnLimitExceeded { .. } | Error::Model(_)
        )
    }

    /// 도구 수준에서 복구되는 에러인지 확인
    pub fn is_tool_level(&self) -> bool {
        matches!(
            self,
            Error::UnknownTool(_)
                | Error::Validation(_)
                | Error::ToolExecution { .. }
                | Error::Timeout(_)
        )
    }

    /// Tool 실행 에러 생성 헬퍼
    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// 게이트웨이 에러 생성 헬퍼
    pub fn gateway_unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::GatewayUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::Parse("x".into()).is_run_fatal());
        assert!(Error::TurnLimitExceeded { max_turns: 3 }.is_run_fatal());
        assert!(!Error::UnknownTool("x".into()).is_run_fatal());

        assert!(Error::Validation("x".into()).is_tool_level());
        assert!(Error::tool_execution("files", "boom").is_tool_level());
        assert!(!Error::Model("x".into()).is_tool_level());
    }

    #[test]
    fn test_display() {
        let err = Error::gateway_unavailable("github", "timed out");
        assert_eq!(
            err.to_string(),
            "Gateway provider 'github' unavailable: timed out"
        );
    }
}
