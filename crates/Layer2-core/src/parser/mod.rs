//! Call Parser - 모델 출력 → 정규화된 도구 호출
//!
//! 하나의 출력 안에서 두 가지 호출 문법을 모두 인식한다.
//!
//! ```text
//! structured:                         markup:
//!   ```tool_calls                       <function_calls>
//!   [{"name": "list_files",             <invoke name="list_files">
//!     "arguments": {"path": "/w"}}]       <parameter name="path">/w</parameter>
//!   ```                                 </invoke>
//!                                       </function_calls>
//! ```
//!
//! 각 문법 파서는 [`RawCall`] 변형을 돌려주고, [`canonicalize`]에서 곧바로
//! 하나의 [`ToolCallRequest`]로 합쳐진다. 이후 컴포넌트는 문법을 구분하지 않는다.
//!
//! 스트리밍 입력은 [`CallParser`]가 처리한다.

mod markup;
mod stream;
mod structured;

pub use stream::{CallParser, ParseEvent};

use crate::tool::{coerce_text, ToolRegistry};
use serde_json::{Map, Value};
use skein_foundation::{CallDialect, Error, ToolCallRequest};
use thiserror::Error as ThisError;

// ============================================================================
// 구분자
// ============================================================================

/// structured 블록 시작
pub const STRUCTURED_OPEN: &str = "```tool_calls";
/// structured 블록 끝
pub const STRUCTURED_CLOSE: &str = "```";
/// markup 블록 시작
pub const MARKUP_OPEN: &str = "<function_calls>";
/// markup 블록 끝
pub const MARKUP_CLOSE: &str = "</function_calls>";

/// 문법별 (시작, 끝) 구분자
pub(crate) fn delimiters(dialect: CallDialect) -> (&'static str, &'static str) {
    match dialect {
        CallDialect::Structured => (STRUCTURED_OPEN, STRUCTURED_CLOSE),
        CallDialect::Markup => (MARKUP_OPEN, MARKUP_CLOSE),
    }
}

// ============================================================================
// ParseError
// ============================================================================

/// 호출 문법 오류 - 현재 턴만 중단시킨다
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ParseError {
    #[error("unterminated {dialect} block")]
    Unterminated { dialect: &'static str },

    #[error("unterminated <{element}> element in markup block")]
    UnterminatedElement { element: String },

    #[error("malformed {dialect} block: {reason}")]
    Malformed {
        dialect: &'static str,
        reason: String,
    },

    #[error("{dialect} block contains no calls")]
    EmptyBlock { dialect: &'static str },

    #[error("invocation without a tool name")]
    MissingName,

    #[error("argument '{param}' of '{tool}' is not a valid {expected}")]
    InvalidArgument {
        tool: String,
        param: String,
        expected: String,
    },
}

impl ParseError {
    pub(crate) fn malformed(dialect: CallDialect, reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            dialect: dialect_name(dialect),
            reason: reason.into(),
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e.to_string())
    }
}

pub(crate) fn dialect_name(dialect: CallDialect) -> &'static str {
    match dialect {
        CallDialect::Structured => "structured",
        CallDialect::Markup => "markup",
    }
}

// ============================================================================
// RawCall - 문법별 파싱 결과
// ============================================================================

/// 문법 파서가 만든 정규화 이전 호출
#[derive(Debug, Clone, PartialEq)]
pub enum RawCall {
    /// JSON 인자 그대로
    Structured {
        name: String,
        arguments: Map<String, Value>,
    },
    /// 텍스트 값 (선언 순서)
    Markup {
        name: String,
        params: Vec<(String, String)>,
    },
}

impl RawCall {
    pub fn name(&self) -> &str {
        match self {
            RawCall::Structured { name, .. } | RawCall::Markup { name, .. } => name,
        }
    }
}

/// 블록 본문 파싱
pub(crate) fn parse_block(dialect: CallDialect, body: &str) -> Result<Vec<RawCall>, ParseError> {
    match dialect {
        CallDialect::Structured => structured::parse(body),
        CallDialect::Markup => markup::parse(body),
    }
}

/// RawCall → ToolCallRequest
///
/// markup 값은 레지스트리에 선언된 타입으로 변환한다. 등록되지 않은 도구는
/// 문자열 그대로 두고, 실행 엔진이 `unknown_tool` 결과를 만든다.
pub fn canonicalize(
    raw: RawCall,
    call_id: String,
    registry: Option<&ToolRegistry>,
) -> Result<ToolCallRequest, ParseError> {
    match raw {
        RawCall::Structured { name, arguments } => Ok(ToolCallRequest::new(
            call_id,
            name,
            arguments,
            CallDialect::Structured,
        )),
        RawCall::Markup { name, params } => {
            let spec = registry.and_then(|r| r.get(&name));
            let mut arguments = Map::new();
            for (param, raw_value) in params {
                let expected = spec.and_then(|s| s.param_type(&param));
                let value = coerce_text(expected, &raw_value).map_err(|expected| {
                    ParseError::InvalidArgument {
                        tool: name.clone(),
                        param: param.clone(),
                        expected,
                    }
                })?;
                arguments.insert(param, value);
            }
            Ok(ToolCallRequest::new(
                call_id,
                name,
                arguments,
                CallDialect::Markup,
            ))
        }
    }
}

/// 시스템 프리앰블에 들어가는 호출 문법 설명
pub fn dialect_instructions() -> String {
    format!(
        "To call tools, use either of the following forms. Calls run in the order written.\n\
         \n\
         1. A structured block:\n\
         {open}\n\
         [{{\"name\": \"<tool>\", \"arguments\": {{\"<param>\": <value>}}}}]\n\
         {close}\n\
         \n\
         2. A markup block:\n\
         {mopen}\n\
         <invoke name=\"<tool>\">\n\
         <parameter name=\"<param>\">value</parameter>\n\
         </invoke>\n\
         {mclose}\n",
        open = STRUCTURED_OPEN,
        close = STRUCTURED_CLOSE,
        mopen = MARKUP_OPEN,
        mclose = MARKUP_CLOSE,
    )
}
