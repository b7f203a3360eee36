//! Dynamic Tool Gateway - MCP 제공자 연동
//!
//! 설정된 외부 제공자에서 도구를 탐색해 레지스트리에 등록합니다.
//!
//! ## 지원 전송
//! - stdio (로컬 프로세스, pull)
//! - SSE (HTTP Server-Sent Events, push)
//!
//! ## 참고
//! - https://modelcontextprotocol.io/

mod client;
mod gateway;
mod transport;
mod types;

pub use client::McpClient;
pub use gateway::{
    gateway_tool_name, GatewayReport, McpToolHandler, ProviderConnector, ToolGateway,
    TransportConnector,
};
pub use transport::{McpTransport, SseTransport, StdioTransport};
pub use types::{McpContent, McpTool, McpToolResult, PROTOCOL_VERSION};

#[cfg(test)]
pub(crate) mod testing {
    //! 테스트용 인메모리 전송

    use super::transport::McpTransport;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use skein_foundation::{Error, Result};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    pub struct FakeTransport {
        tools: Vec<(String, Value)>,
        fail_initialize: bool,
        list_delay: Option<Duration>,
        methods: Mutex<Vec<String>>,
        connected: AtomicBool,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self {
                tools: Vec::new(),
                fail_initialize: false,
                list_delay: None,
                methods: Mutex::new(Vec::new()),
                connected: AtomicBool::new(true),
            }
        }

        pub fn tool(mut self, name: &str, schema: Value) -> Self {
            self.tools.push((name.to_string(), schema));
            self
        }

        pub fn failing_initialize(mut self) -> Self {
            self.fail_initialize = true;
            self
        }

        pub fn slow_listing(mut self, delay: Duration) -> Self {
            self.list_delay = Some(delay);
            self
        }

        pub fn methods(&self) -> Vec<String> {
            self.methods.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl McpTransport for FakeTransport {
        async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
            self.methods.lock().unwrap().push(method.to_string());
            match method {
                "initialize" if self.fail_initialize => Err(Error::Mcp("refused".into())),
                "initialize" => Ok(json!({
                    "protocolVersion": "2024-11-05",
                    "serverInfo": { "name": "fake", "version": "0.0.1" }
                })),
                "tools/list" => {
                    if let Some(delay) = self.list_delay {
                        tokio::time::sleep(delay).await;
                    }
                    let tools: Vec<Value> = self
                        .tools
                        .iter()
                        .map(|(name, schema)| {
                            json!({ "name": name, "description": format!("fake {}", name), "inputSchema": schema })
                        })
                        .collect();
                    Ok(json!({ "tools": tools }))
                }
                "tools/call" => {
                    let params = params.unwrap_or_default();
                    let name = params["name"].as_str().unwrap_or_default().to_string();
                    if name == "explode" {
                        return Ok(json!({
                            "content": [{ "type": "text", "text": "it exploded" }],
                            "isError": true
                        }));
                    }
                    Ok(json!({
                        "content": [{ "type": "text", "text": format!("{}:{}", name, params["arguments"]) }]
                    }))
                }
                other => Err(Error::Mcp(format!("unsupported {}", other))),
            }
        }

        async fn notify(&self, method: &str, _params: Option<Value>) -> Result<()> {
            self.methods.lock().unwrap().push(method.to_string());
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }
}
