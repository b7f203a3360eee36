//! Core Types - 공용 타입 정의
//!
//! 모든 레이어에서 공통으로 사용하는 타입들
//! - `Message`: 스레드에 append되는 불변 메시지
//! - `ToolCallRequest` / `ToolResult`: 도구 호출 요청/응답 쌍
//! - `TokenUsage`: 모델 사용량

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Message & Role
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        write!(f, "{}", s)
    }
}

/// 스레드 메시지 (append 이후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    /// assistant 메시지가 요청한 도구 호출
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// tool 메시지가 싣고 있는 결과
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            tool_calls: None,
            tool_results: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// 도구 호출을 포함한 assistant 메시지
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        let mut msg = Self::new(MessageRole::Assistant, content);
        if !calls.is_empty() {
            msg.tool_calls = Some(calls);
        }
        msg
    }

    /// 한 턴의 도구 결과를 담은 tool 메시지
    ///
    /// content에는 모델이 읽을 수 있도록 결과를 JSON 한 줄씩 렌더링한다.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        let content = results
            .iter()
            .map(ToolResult::render)
            .collect::<Vec<_>>()
            .join("\n");
        let mut msg = Self::new(MessageRole::Tool, content);
        msg.tool_results = Some(results);
        msg
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}

// ============================================================================
// Tool Call Request - 정규화된 호출 요청
// ============================================================================

/// 호출이 어떤 문법으로 작성되었는지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDialect {
    /// JSON 블록 형태의 호출 목록
    Structured,
    /// 태그로 감싼 markup 호출
    Markup,
}

/// 정규화된 도구 호출 요청 (Call Parser만 생성한다)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
    pub dialect: CallDialect,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
        dialect: CallDialect,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
            dialect,
        }
    }

    /// dialect를 제외한 비교 (이름 + 인자)
    pub fn same_invocation(&self, other: &ToolCallRequest) -> bool {
        self.name == other.name && self.arguments == other.arguments
    }
}

// ============================================================================
// Tool Result - 호출 결과
// ============================================================================

/// 실패 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    Validation,
    Execution,
    Timeout,
    /// terminal 호출 이후 순차 전략에서 실행되지 않음
    Skipped,
}

/// 실패 상세
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ToolErrorKind,
    pub message: String,
}

/// 도구 호출 결과 - call_id로 요청과 짝을 이룬다
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub success: bool,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
    /// 런 종료 도구의 결과
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminal: bool,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn success(call: &ToolCallRequest, output: Value) -> Self {
        Self {
            call_id: call.call_id.clone(),
            tool_name: call.name.clone(),
            success: true,
            output,
            error: None,
            terminal: false,
            duration_ms: 0,
        }
    }

    pub fn failure(call: &ToolCallRequest, kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            call_id: call.call_id.clone(),
            tool_name: call.name.clone(),
            success: false,
            output: Value::Null,
            error: Some(ToolFailure {
                kind,
                message: message.into(),
            }),
            terminal: false,
            duration_ms: 0,
        }
    }

    pub fn with_terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// 모델 컨텍스트용 한 줄 렌더링
    pub fn render(&self) -> String {
        let body = if self.success {
            serde_json::json!({
                "call_id": self.call_id,
                "name": self.tool_name,
                "success": true,
                "output": self.output,
            })
        } else {
            serde_json::json!({
                "call_id": self.call_id,
                "name": self.tool_name,
                "success": false,
                "error": self.error.as_ref().map(|e| e.message.clone()),
            })
        };
        body.to_string()
    }
}

// ============================================================================
// Token Usage
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}
