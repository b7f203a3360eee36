//! Control Tool - 런 제어
//!
//! `complete`는 런 종료 액션이다. 호출되면 해당 턴의 결과를 기록한 뒤 런이 끝난다.

use async_trait::async_trait;
use skein_foundation::{Error, Result, Tool, ToolContext, ToolMethod, ToolOutput};
use serde_json::{json, Value};

pub struct ControlTool;

impl ControlTool {
    pub fn new() -> Self {
        Self
    }

    pub const NAME: &'static str = "control";
}

impl Default for ControlTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ControlTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn methods(&self) -> Vec<ToolMethod> {
        vec![ToolMethod::new("complete")
            .description("Finish the run with a final summary for the user.")
            .schema(json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string", "description": "Final answer" }
                },
                "required": ["summary"]
            }))
            .terminal()]
    }

    async fn call(&self, method: &str, args: Value, _ctx: &dyn ToolContext) -> Result<ToolOutput> {
        match method {
            "complete" => {
                let summary = args
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                Ok(ToolOutput::success(json!({ "summary": summary })))
            }
            other => Err(Error::UnknownTool(other.to_string())),
        }
    }
}
