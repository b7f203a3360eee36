//! structured 문법 - JSON 호출 목록
//!
//! 허용하는 형태:
//! - `[{"name": ..., "arguments": {...}}, ...]`
//! - `{"name": ..., "arguments": {...}}` (단일 호출)
//! - `{"tool_calls": [...]}`
//!
//! `arguments`는 객체, `null`/생략, 또는 JSON 객체를 담은 문자열일 수 있다.

use super::{ParseError, RawCall};
use serde_json::{Map, Value};
use skein_foundation::CallDialect;

const DIALECT: CallDialect = CallDialect::Structured;

pub(crate) fn parse(body: &str) -> Result<Vec<RawCall>, ParseError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ParseError::EmptyBlock {
            dialect: "structured",
        });
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseError::malformed(DIALECT, e.to_string()))?;

    let records = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("tool_calls") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(ParseError::malformed(DIALECT, "'tool_calls' must be a list"));
            }
            None => vec![Value::Object(obj)],
        },
        other => {
            return Err(ParseError::malformed(
                DIALECT,
                format!("expected a list of calls, got {}", other),
            ));
        }
    };

    if records.is_empty() {
        return Err(ParseError::EmptyBlock {
            dialect: "structured",
        });
    }

    records.into_iter().map(record).collect()
}

fn record(value: Value) -> Result<RawCall, ParseError> {
    let Value::Object(mut obj) = value else {
        return Err(ParseError::malformed(DIALECT, "call record must be an object"));
    };

    let name = match obj.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return Err(ParseError::MissingName),
    };

    let arguments = match obj.remove("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(args)) => args,
        // 일부 모델은 인자를 문자열로 직렬화해서 보낸다
        Some(Value::String(text)) if text.trim().is_empty() => Map::new(),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(args)) => args,
            _ => {
                return Err(ParseError::malformed(
                    DIALECT,
                    format!("arguments of '{}' are not an object", name),
                ));
            }
        },
        Some(_) => {
            return Err(ParseError::malformed(
                DIALECT,
                format!("arguments of '{}' are not an object", name),
            ));
        }
    };

    Ok(RawCall::Structured { name, arguments })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_preserves_order() {
        let calls = parse(
            r#"[
                {"name": "list_files", "arguments": {"path": "/workspace"}},
                {"name": "complete", "arguments": {"summary": "done"}}
            ]"#,
        )
        .unwrap();
        let names: Vec<&str> = calls.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["list_files", "complete"]);
    }

    #[test]
    fn test_accepted_shapes() {
        let single = parse(r#"{"name": "list_files"}"#).unwrap();
        assert_eq!(
            single,
            vec![RawCall::Structured {
                name: "list_files".into(),
                arguments: Map::new()
            }]
        );

        let wrapped = parse(r#"{"tool_calls": [{"name": "a", "arguments": null}]}"#).unwrap();
        assert_eq!(wrapped.len(), 1);

        let stringified = parse(r#"[{"name": "a", "arguments": "{\"x\": 1}"}]"#).unwrap();
        match &stringified[0] {
            RawCall::Structured { arguments, .. } => assert_eq!(arguments["x"], json!(1)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(parse("[{\"name\": "), Err(ParseError::Malformed { .. })));
        assert!(matches!(parse("[]"), Err(ParseError::EmptyBlock { .. })));
        assert!(matches!(parse("  "), Err(ParseError::EmptyBlock { .. })));
        assert!(matches!(parse(r#"[{"arguments": {}}]"#), Err(ParseError::MissingName)));
        assert!(matches!(
            parse(r#"[{"name": "a", "arguments": [1]}]"#),
            Err(ParseError::Malformed { .. })
        ));
        assert!(matches!(parse("42"), Err(ParseError::Malformed { .. })));
    }
}
