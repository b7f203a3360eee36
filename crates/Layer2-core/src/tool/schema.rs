//! Schema table - (이름, 문법별 스키마, 핸들러) 행
//!
//! 도구 인스턴스의 메서드 선언은 레지스트리 초기화 시 한 번 `ToolSpecification`으로
//! 변환되고, 이후에는 읽기 전용이다. 게이트웨이 도구도 같은 형태로 만들어진다.

use async_trait::async_trait;
use skein_foundation::{
    Error, MarkupSchema, Result, Tool, ToolContext, ToolHandler, ToolMethod, ToolOutput,
};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// ToolSource - 도구 출처
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolSource {
    /// 컴파일된 도구 인스턴스의 메서드
    Builtin { tool: String },
    /// 게이트웨이가 탐색한 외부 도구
    Gateway { provider: String, tool: String },
}

impl fmt::Display for ToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolSource::Builtin { tool } => write!(f, "builtin:{}", tool),
            ToolSource::Gateway { provider, tool } => write!(f, "mcp:{}:{}", provider, tool),
        }
    }
}

// ============================================================================
// ToolSpecification
// ============================================================================

/// 레지스트리에 등록되는 호출 가능한 도구 하나
#[derive(Clone)]
pub struct ToolSpecification {
    pub name: String,
    pub description: String,
    /// structured 문법 스키마 (JSON Schema)
    pub structured: Option<Value>,
    /// markup 문법 스키마
    pub markup: Option<MarkupSchema>,
    pub terminal: bool,
    pub source: ToolSource,
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpecification")
            .field("name", &self.name)
            .field("terminal", &self.terminal)
            .field("source", &self.source)
            .finish()
    }
}

impl ToolSpecification {
    pub fn new(
        name: impl Into<String>,
        source: ToolSource,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            structured: None,
            markup: None,
            terminal: false,
            source,
            handler,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// structured 스키마 지정 (markup 스키마가 없으면 여기서 파생)
    pub fn schema(mut self, schema: Value) -> Self {
        if self.markup.is_none() {
            self.markup = Some(MarkupSchema::from_json_schema(&self.name, &schema));
        }
        self.structured = Some(schema);
        self
    }

    pub fn markup(mut self, markup: MarkupSchema) -> Self {
        self.markup = Some(markup);
        self
    }

    pub fn terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    /// 도구 인스턴스의 메서드 선언 한 행을 변환
    pub fn from_method(tool: Arc<dyn Tool>, method: ToolMethod) -> Result<Self> {
        if method.structured.is_none() && method.markup.is_none() {
            return Err(Error::InvalidInput(format!(
                "method '{}' of tool '{}' declares no call schema",
                method.name,
                tool.name()
            )));
        }

        let source = ToolSource::Builtin {
            tool: tool.name().to_string(),
        };
        let handler: Arc<dyn ToolHandler> = Arc::new(MethodHandler {
            tool,
            method: method.name.clone(),
        });

        let mut spec = ToolSpecification::new(method.name, source, handler)
            .description(method.description)
            .terminal(method.terminal);
        if let Some(markup) = method.markup {
            spec = spec.markup(markup);
        }
        if let Some(schema) = method.structured {
            spec = spec.schema(schema);
        }
        Ok(spec)
    }

    /// 파라미터의 선언 타입 (structured 스키마 기준)
    pub fn param_type(&self, param: &str) -> Option<&str> {
        let prop = self.structured.as_ref()?.get("properties")?.get(param)?;
        match prop.get("type")? {
            Value::String(t) => Some(t.as_str()),
            // ["string", "null"] 같은 경우 첫 번째 non-null 타입
            Value::Array(types) => types
                .iter()
                .filter_map(|t| t.as_str())
                .find(|t| *t != "null"),
            _ => None,
        }
    }

    /// 인자 검증
    ///
    /// structured 스키마가 있으면 required / 타입 / additionalProperties를,
    /// 없으면 markup 스키마의 required 파라미터만 확인한다.
    pub fn validate(&self, args: &Map<String, Value>) -> std::result::Result<(), String> {
        if let Some(schema) = &self.structured {
            return validate_object(schema, args);
        }

        if let Some(markup) = &self.markup {
            for param in markup.params.iter().filter(|p| p.required) {
                if !args.contains_key(&param.name) {
                    return Err(format!("missing required argument '{}'", param.name));
                }
            }
        }
        Ok(())
    }

    /// markup 값(텍스트)을 선언 타입으로 변환
    pub fn coerce_text(&self, param: &str, raw: &str) -> std::result::Result<Value, String> {
        coerce_text(self.param_type(param), raw)
    }
}

// ============================================================================
// MethodHandler - 도구 인스턴스 메서드 → ToolHandler
// ============================================================================

struct MethodHandler {
    tool: Arc<dyn Tool>,
    method: String,
}

#[async_trait]
impl ToolHandler for MethodHandler {
    async fn invoke(&self, args: Value, ctx: &dyn ToolContext) -> Result<ToolOutput> {
        self.tool.call(&self.method, args, ctx).await
    }
}

// ============================================================================
// 검증 / 변환 유틸리티
// ============================================================================

fn validate_object(schema: &Value, args: &Map<String, Value>) -> std::result::Result<(), String> {
    let required = schema
        .get("required")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str());
    for name in required {
        if !args.contains_key(name) {
            return Err(format!("missing required argument '{}'", name));
        }
    }

    let properties = schema.get("properties").and_then(|v| v.as_object());
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (name, value) in args {
        match properties.and_then(|p| p.get(name)) {
            Some(prop) => {
                if let Some(expected) = prop.get("type") {
                    if !type_matches(expected, value) {
                        return Err(format!(
                            "argument '{}' should be {}, got {}",
                            name,
                            expected,
                            json_type_name(value)
                        ));
                    }
                }
            }
            None if closed => return Err(format!("unexpected argument '{}'", name)),
            None => {}
        }
    }
    Ok(())
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(t) => single_type_matches(t, value),
        Value::Array(types) => types
            .iter()
            .filter_map(|t| t.as_str())
            .any(|t| single_type_matches(t, value)),
        _ => true,
    }
}

fn single_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 텍스트 값을 선언 타입으로 변환. 타입 정보가 없으면 문자열 그대로.
pub fn coerce_text(expected: Option<&str>, raw: &str) -> std::result::Result<Value, String> {
    let trimmed = raw.trim();
    match expected {
        Some("integer") => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| "integer".to_string()),
        Some("number") => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(|n| {
                // 정수로 표현 가능한 값은 structured 쪽과 같은 표현이 되도록
                match trimmed.parse::<i64>() {
                    Ok(i) => Value::from(i),
                    Err(_) => Value::Number(n),
                }
            })
            .ok_or_else(|| "number".to_string()),
        Some("boolean") => match trimmed {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err("boolean".to_string()),
        },
        Some("array") => match serde_json::from_str::<Value>(trimmed) {
            Ok(v @ Value::Array(_)) => Ok(v),
            _ => Err("array".to_string()),
        },
        Some("object") => match serde_json::from_str::<Value>(trimmed) {
            Ok(v @ Value::Object(_)) => Ok(v),
            _ => Err("object".to_string()),
        },
        Some("null") if trimmed.is_empty() || trimmed == "null" => Ok(Value::Null),
        _ => Ok(Value::String(raw.to_string())),
    }
}
