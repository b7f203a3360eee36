//! MCP Client - 게이트웨이 제공자 하나와의 세션
//!
//! `initialize` → `notifications/initialized` 핸드셰이크 후
//! `tools/list`로 도구를 탐색하고 `tools/call`로 호출을 전달한다.

use super::transport::{McpTransport, SseTransport, StdioTransport};
use super::types::{ListToolsResult, McpTool, McpToolResult, PROTOCOL_VERSION};
use serde::Deserialize;
use serde_json::{json, Value};
use skein_foundation::{Error, Result, TransportConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    #[serde(default)]
    protocol_version: String,
    #[serde(default)]
    server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerInfo {
    name: String,
    #[serde(default)]
    version: String,
}

/// 제공자 클라이언트
pub struct McpClient {
    name: String,
    transport: Arc<dyn McpTransport>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("name", &self.name)
            .field("connected", &self.transport.is_connected())
            .finish()
    }
}

impl McpClient {
    /// 설정된 전송으로 연결하고 핸드셰이크까지 마친다
    pub async fn connect(
        name: impl Into<String>,
        config: &TransportConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let name = name.into();
        info!("Connecting to gateway provider '{}' ({})", name, config.kind());

        let transport: Arc<dyn McpTransport> = match config {
            TransportConfig::Stdio { command, args, env } => {
                Arc::new(StdioTransport::spawn(command, args, env, timeout).await?)
            }
            TransportConfig::Sse { url } => Arc::new(SseTransport::connect(url, timeout).await?),
        };

        Self::with_transport(name, transport).await
    }

    /// 이미 만들어진 전송 위에서 핸드셰이크
    pub async fn with_transport(
        name: impl Into<String>,
        transport: Arc<dyn McpTransport>,
    ) -> Result<Self> {
        let client = Self {
            name: name.into(),
            transport,
        };
        if let Err(e) = client.initialize().await {
            let _ = client.transport.close().await;
            return Err(e);
        }
        Ok(client)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn initialize(&self) -> Result<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "skein",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });

        let result = self.transport.request("initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| Error::Mcp(format!("invalid initialize response: {}", e)))?;

        match &init.server_info {
            Some(info) => debug!(
                "Provider '{}' is {} {} (protocol {})",
                self.name, info.name, info.version, init.protocol_version
            ),
            None => debug!(
                "Provider '{}' initialized (protocol {})",
                self.name, init.protocol_version
            ),
        }

        self.transport
            .notify("notifications/initialized", None)
            .await
    }

    /// `tools/list` (페이지네이션 커서를 따라간다)
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.transport.request("tools/list", params).await?;

            cursor = result
                .get("nextCursor")
                .and_then(|c| c.as_str())
                .map(str::to_string);
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| Error::Mcp(format!("invalid tools/list response: {}", e)))?;
            tools.extend(page.tools);

            if cursor.is_none() {
                break;
            }
        }

        debug!("Provider '{}' lists {} tools", self.name, tools.len());
        Ok(tools)
    }

    /// `tools/call`
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<McpToolResult> {
        let params = json!({ "name": tool, "arguments": arguments });
        let result = self.transport.request("tools/call", Some(params)).await?;
        serde_json::from_value(result)
            .map_err(|e| Error::Mcp(format!("invalid tools/call response: {}", e)))
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}
