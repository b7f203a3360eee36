//! Skein Config - 통합 설정
//!
//! 모든 필드는 기본값을 가지므로 빈 `{}` 파일도 유효한 설정이다.

use super::{ExecutionStrategy, GatewaySettings, ToolSelection};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 설정 폴더 이름
pub const CONFIG_DIR_NAME: &str = ".skein";

// ============================================================================
// Skein Config (통합)
// ============================================================================

/// skein 통합 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkeinConfig {
    #[serde(default)]
    pub runtime: RuntimeSettings,

    #[serde(default)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub model: ModelSettings,

    /// 기본 도구 선택 (런 옵션으로 덮어쓸 수 있음)
    #[serde(default)]
    pub tools: ToolSelection,
}

impl SkeinConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.runtime.max_turns = max_turns;
        self
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.runtime.strategy = strategy;
        self
    }
}

// ============================================================================
// Runtime - 턴 루프 / 실행 엔진
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSettings {
    /// 최대 턴 수
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    #[serde(default)]
    pub strategy: ExecutionStrategy,

    /// 병렬 전략에서 동시 실행 수
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// 도구 호출 하나의 제한 시간 (초)
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// 시스템 프리앰블 머리말 덮어쓰기
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_turns() -> u32 {
    25
}

fn default_max_concurrency() -> usize {
    4
}

fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            strategy: ExecutionStrategy::default(),
            max_concurrency: default_max_concurrency(),
            tool_timeout_secs: default_tool_timeout_secs(),
            system_prompt: None,
        }
    }
}

impl RuntimeSettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

// ============================================================================
// Relay - 이벤트 백로그 / 구독자 큐
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySettings {
    /// 런당 백로그에 보관하는 이벤트 수
    #[serde(default = "default_backlog_capacity")]
    pub backlog_capacity: usize,

    /// 구독자당 전달 큐 크기
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,

    /// 런 종료 후 백로그 보관 시간 (초)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// 만료된 백로그 정리 주기 (초)
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,
}

fn default_backlog_capacity() -> usize {
    1024
}

fn default_subscriber_queue() -> usize {
    256
}

fn default_retention_secs() -> u64 {
    300
}

fn default_janitor_interval_secs() -> u64 {
    30
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            backlog_capacity: default_backlog_capacity(),
            subscriber_queue: default_subscriber_queue(),
            retention_secs: default_retention_secs(),
            janitor_interval_secs: default_janitor_interval_secs(),
        }
    }
}

impl RelaySettings {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs.max(1))
    }
}

// ============================================================================
// Model - OpenAI 호환 엔드포인트
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// API 키를 읽을 환경 변수
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}
