//! 외부 도구 제공자(MCP) 설정

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 게이트웨이 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySettings {
    /// 제공자 하나당 탐색 제한 시간 (초)
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,

    /// 탐색 이후 `tools/call` 요청 하나의 제한 시간 (초)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// 제공자 목록
    #[serde(default)]
    pub providers: Vec<GatewayProviderConfig>,
}

fn default_discovery_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            discovery_timeout_secs: default_discovery_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            providers: Vec::new(),
        }
    }
}

impl GatewaySettings {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 활성화된 제공자만
    pub fn enabled_providers(&self) -> impl Iterator<Item = &GatewayProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

/// 제공자 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayProviderConfig {
    /// 제공자 이름 (`mcp_{name}_{tool}` 접두사)
    pub name: String,

    pub transport: TransportConfig,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl GatewayProviderConfig {
    pub fn new(name: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            name: name.into(),
            transport,
            enabled: true,
        }
    }
}

/// 전송 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// stdio 전송 (로컬 자식 프로세스, pull)
    Stdio {
        /// 실행 명령어
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },

    /// SSE 전송 (장기 연결, push)
    Sse {
        /// 서버 URL
        url: String,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Stdio { .. } => "stdio",
            TransportConfig::Sse { .. } => "sse",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config_deserialize() {
        let json = r#"{
            "discoveryTimeoutSecs": 3,
            "providers": [
                { "name": "fs", "transport": { "type": "stdio", "command": "mcp-fs", "args": ["--root", "/tmp"] } },
                { "name": "web", "transport": { "type": "sse", "url": "http://localhost:9000/sse" }, "enabled": false }
            ]
        }"#;

        let settings: GatewaySettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.discovery_timeout(), Duration::from_secs(3));
        assert_eq!(settings.providers.len(), 2);
        assert_eq!(settings.providers[0].transport.kind(), "stdio");
        assert_eq!(settings.enabled_providers().count(), 1);
    }
}
