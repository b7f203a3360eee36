//! Tool Gateway - 제공자 탐색과 레지스트리 등록
//!
//! 런이 시작되기 전에 한 번 실행된다.
//! 1. 활성화된 제공자 모두에 동시에 연결해서 `tools/list` (제공자마다 제한 시간)
//! 2. 실패하거나 시간 안에 응답하지 않은 제공자는 경고만 남기고 건너뜀
//! 3. 탐색된 도구마다 `mcp_{provider}_{tool}` 이름의 `ToolSpecification` 생성
//!
//! 등록된 핸들러는 인자를 `tools/call`로 전달하고 응답을 `ToolOutput`으로 바꾼다.

use super::client::McpClient;
use super::types::McpTool;
use crate::tool::{ToolRegistry, ToolSource, ToolSpecification};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use skein_foundation::{
    Error, GatewayProviderConfig, GatewaySettings, Result, ToolContext, ToolHandler, ToolOutput,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 제공자 연결 방법 (테스트에서 교체 가능)
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    async fn connect(&self, provider: &GatewayProviderConfig, timeout: Duration) -> Result<McpClient>;
}

/// 설정된 전송(stdio / sse)으로 연결
pub struct TransportConnector;

#[async_trait]
impl ProviderConnector for TransportConnector {
    async fn connect(&self, provider: &GatewayProviderConfig, timeout: Duration) -> Result<McpClient> {
        McpClient::connect(&provider.name, &provider.transport, timeout).await
    }
}

/// 등록 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayReport {
    /// 등록된 도구 이름 (`mcp_{provider}_{tool}`)
    pub registered: Vec<String>,
    /// 건너뛴 제공자와 이유
    pub skipped: Vec<(String, String)>,
}

struct Discovered {
    client: Arc<McpClient>,
    tools: Vec<McpTool>,
}

/// 동적 도구 게이트웨이
pub struct ToolGateway {
    settings: GatewaySettings,
    connector: Arc<dyn ProviderConnector>,
    clients: Mutex<Vec<Arc<McpClient>>>,
}

impl ToolGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        Self::with_connector(settings, Arc::new(TransportConnector))
    }

    pub fn with_connector(settings: GatewaySettings, connector: Arc<dyn ProviderConnector>) -> Self {
        Self {
            settings,
            connector,
            clients: Mutex::new(Vec::new()),
        }
    }

    /// 탐색 후 레지스트리에 등록
    ///
    /// 도달할 수 없는 제공자는 실패가 아니다. 이름 충돌은 `DuplicateTool`.
    pub async fn register_into(&self, registry: &mut ToolRegistry) -> Result<GatewayReport> {
        let providers: Vec<&GatewayProviderConfig> = self.settings.enabled_providers().collect();
        if providers.is_empty() {
            return Ok(GatewayReport::default());
        }

        info!("Discovering tools from {} gateway providers", providers.len());
        let results = join_all(providers.iter().map(|p| self.discover(p))).await;

        let mut report = GatewayReport::default();
        for (provider, result) in providers.iter().zip(results) {
            let discovered = match result {
                Ok(d) => d,
                Err(reason) => {
                    warn!("{}", Error::gateway_unavailable(&provider.name, &reason));
                    report.skipped.push((provider.name.clone(), reason));
                    continue;
                }
            };

            for tool in &discovered.tools {
                let spec = gateway_spec(&provider.name, tool, Arc::clone(&discovered.client));
                let name = spec.name.clone();
                registry.register_spec(spec)?;
                debug!("Registered gateway tool {}", name);
                report.registered.push(name);
            }
            self.clients.lock().await.push(discovered.client);
        }

        info!(
            "Gateway registered {} tools, skipped {} providers",
            report.registered.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// 제공자 하나 탐색 (제한 시간 포함). 실패 이유를 문자열로 돌려준다.
    async fn discover(&self, provider: &GatewayProviderConfig) -> std::result::Result<Discovered, String> {
        let timeout = self.settings.discovery_timeout();
        let request_timeout = self.settings.request_timeout();

        let attempt = async {
            let client = self.connector.connect(provider, request_timeout).await?;
            match client.list_tools().await {
                Ok(tools) => Ok(Discovered {
                    client: Arc::new(client),
                    tools,
                }),
                Err(e) => {
                    let _ = client.close().await;
                    Err(e)
                }
            }
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(discovered)) => Ok(discovered),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("no response within {}s", timeout.as_secs())),
        }
    }

    /// 연결된 제공자 모두 종료
    pub async fn shutdown(&self) {
        let clients: Vec<Arc<McpClient>> = self.clients.lock().await.drain(..).collect();
        for client in clients {
            if let Err(e) = client.close().await {
                debug!("Closing provider '{}' failed: {}", client.name(), e);
            }
        }
    }
}

/// 게이트웨이 도구 이름
pub fn gateway_tool_name(provider: &str, tool: &str) -> String {
    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect()
    };
    format!("mcp_{}_{}", clean(provider), clean(tool))
}

fn gateway_spec(provider: &str, tool: &McpTool, client: Arc<McpClient>) -> ToolSpecification {
    let handler = Arc::new(McpToolHandler {
        client,
        tool: tool.name.clone(),
    });
    let source = ToolSource::Gateway {
        provider: provider.to_string(),
        tool: tool.name.clone(),
    };

    ToolSpecification::new(gateway_tool_name(provider, &tool.name), source, handler)
        .description(tool.description.clone().unwrap_or_default())
        .schema(tool.input_schema.clone())
}

/// `tools/call` 전달 핸들러
pub struct McpToolHandler {
    client: Arc<McpClient>,
    tool: String,
}

#[async_trait]
impl ToolHandler for McpToolHandler {
    async fn invoke(&self, args: Value, _ctx: &dyn ToolContext) -> Result<ToolOutput> {
        let result = self.client.call_tool(&self.tool, args).await?;
        let text = result.text();
        if result.is_error {
            return Ok(ToolOutput::error(text));
        }
        Ok(ToolOutput::text(text))
    }
}
