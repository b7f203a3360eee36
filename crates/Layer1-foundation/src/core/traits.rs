//! Core Traits - 핵심 인터페이스 정의
//!
//! Layer2 이상에서 구현해야 하는 핵심 trait들을 정의합니다.
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Layer3-Agent                                               │
//! │  └── ToolContext 구현 (run/thread 정보)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layer2-Core                                                │
//! │  ├── Tool 구현 (files, control)                              │
//! │  ├── ToolHandler 구현 (메서드 핸들러, MCP 핸들러)             │
//! │  └── ToolRegistry: (이름, 스키마, 핸들러) 테이블              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layer1-Foundation (이 레이어)                              │
//! │  └── Trait 정의 (Tool, ToolHandler, ToolContext)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

// ============================================================================
// Tool Output - 핸들러 반환값
// ============================================================================

/// 핸들러 실행 결과
///
/// `Err`는 핸들러가 실패(raise)한 경우이고, `success=false`인 `Ok`는
/// 도구가 정상적으로 실패를 보고한 경우다. 두 경우 모두 실패한 `ToolResult`가 된다.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn text(output: impl Into<String>) -> Self {
        Self::success(Value::String(output.into()))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(message.into()),
        }
    }
}

// ============================================================================
// Dialect Schemas - 호출 문법별 스키마
// ============================================================================

/// markup 호출의 파라미터 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupParam {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

/// markup(태그) 문법 스키마
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupSchema {
    /// `<invoke name="...">`에 쓰이는 이름
    pub tag: String,
    pub params: Vec<MarkupParam>,
}

impl MarkupSchema {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, required: bool) -> Self {
        self.params.push(MarkupParam {
            name: name.into(),
            required,
        });
        self
    }

    /// JSON Schema의 properties/required에서 파생
    pub fn from_json_schema(tag: impl Into<String>, schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let mut params: Vec<MarkupParam> = schema
            .get("properties")
            .and_then(|v| v.as_object())
            .map(|props| {
                props
                    .keys()
                    .map(|name| MarkupParam {
                        name: name.clone(),
                        required: required.contains(&name.as_str()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        // required 먼저, 그 다음 이름순
        params.sort_by(|a, b| b.required.cmp(&a.required).then(a.name.cmp(&b.name)));

        Self {
            tag: tag.into(),
            params,
        }
    }
}

// ============================================================================
// Tool Trait - 도구 인터페이스
// ============================================================================

/// 도구 메서드 선언 (선언적 테이블의 한 행)
#[derive(Debug, Clone)]
pub struct ToolMethod {
    /// 호출 이름 (레지스트리 키)
    pub name: String,
    pub description: String,
    /// structured 문법용 JSON Schema
    pub structured: Option<Value>,
    /// markup 문법용 스키마
    pub markup: Option<MarkupSchema>,
    /// 런 종료 액션 여부
    pub terminal: bool,
}

impl ToolMethod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            structured: None,
            markup: None,
            terminal: false,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.structured = Some(schema);
        self
    }

    pub fn markup(mut self, markup: MarkupSchema) -> Self {
        self.markup = Some(markup);
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

/// 도구 인스턴스
///
/// 하나의 인스턴스가 여러 호출 가능한 메서드를 제공한다.
/// 레지스트리는 `methods()`를 한 번 읽어 (이름, 스키마, 핸들러) 테이블을 만든다.
#[async_trait]
pub trait Tool: Send + Sync {
    /// 인스턴스 이름 (로그용)
    fn name(&self) -> &str;

    /// 메서드 테이블
    fn methods(&self) -> Vec<ToolMethod>;

    /// 메서드 실행
    async fn call(&self, method: &str, args: Value, ctx: &dyn ToolContext) -> Result<ToolOutput>;
}

/// 균일한 호출 계약 - 정적 도구와 게이트웨이 도구 모두 이 형태로 등록된다
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, args: Value, ctx: &dyn ToolContext) -> Result<ToolOutput>;
}

/// 도구 실행 컨텍스트
///
/// Layer3-agent에서 런마다 만들어 전달합니다.
pub trait ToolContext: Send + Sync {
    /// 현재 작업 디렉토리
    fn working_dir(&self) -> &Path;

    /// 실행 중인 런 ID
    fn run_id(&self) -> &str;

    /// 대상 스레드 ID
    fn thread_id(&self) -> &str;

    /// 환경 변수
    fn env(&self) -> &HashMap<String, String>;
}
