//! OpenAI-compatible provider with SSE streaming support
//!
//! Chat Completions 형식을 말하는 엔드포인트라면 어디든 (`baseUrl`).
//! 도구 호출은 텍스트 문법으로 주고받으므로 `tools` 필드는 보내지 않는다.

use crate::{
    error::ProviderError,
    retry::{with_retry, RetryConfig},
    r#trait::{ChunkStream, ModelChunk, Provider},
};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use skein_foundation::{Message, MessageRole, ModelSettings, TokenUsage};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
    retry: RetryConfig,
}

impl OpenAiProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            base_url: ModelSettings::default().base_url,
            retry: RetryConfig::default(),
        })
    }

    /// `model` 설정 섹션에서 생성. API 키는 `apiKeyEnv` 환경 변수에서 읽는다.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self, ProviderError> {
        let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
            ProviderError::NotConfigured(format!(
                "environment variable {} is not set",
                settings.api_key_env
            ))
        })?;

        Ok(Self::new(api_key, settings.model.clone(), settings.max_tokens)?
            .with_base_url(settings.base_url.clone()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ProviderError> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn build_request(&self, messages: &[Message], system_prompt: Option<&str>) -> ChatRequest {
        let mut api_messages = Vec::with_capacity(messages.len() + 1);

        if let Some(system) = system_prompt {
            api_messages.push(ChatMessage {
                role: "system",
                content: system.to_string(),
            });
        }

        for msg in messages {
            let role = match msg.role {
                // 프리앰블은 system_prompt로 따로 전달된다
                MessageRole::System => continue,
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                // 결과는 텍스트 문법의 일부이므로 tool_call_id 없이 user 턴으로
                MessageRole::Tool => "user",
            };
            api_messages.push(ChatMessage {
                role,
                content: msg.content.clone(),
            });
        }

        ChatRequest {
            model: self.model.clone(),
            messages: api_messages,
            max_tokens: Some(self.max_tokens),
            stream: true,
            stream_options: Some(StreamOptions { include_usage: true }),
        }
    }

    fn parse_error_response(status: reqwest::StatusCode, body: &str) -> ProviderError {
        if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(body) {
            let message = error_response.error.message;
            return match error_response.error.code.as_deref() {
                Some("rate_limit_exceeded") => ProviderError::RateLimited {
                    retry_after_ms: None,
                },
                Some("context_length_exceeded") => ProviderError::ContextLengthExceeded(message),
                Some("invalid_api_key") => ProviderError::Authentication(message),
                _ => ProviderError::from_http_status(status.as_u16(), &message),
            };
        }
        ProviderError::from_http_status(status.as_u16(), body)
    }

    /// 요청 전송 (상태 코드 확인까지만 재시도)
    async fn open(&self, request: &ChatRequest) -> Result<reqwest::Response, ProviderError> {
        with_retry(&self.retry, "openai stream", move || async move {
            let response = self
                .client
                .post(&self.base_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Accept", "text/event-stream")
                .json(request)
                .send()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?;

            if response.status().is_success() {
                return Ok(response);
            }
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Self::parse_error_response(status, &body))
        })
        .await
    }
}

fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn stream(&self, messages: Vec<Message>, system_prompt: Option<String>) -> ChunkStream<'_> {
        let request = self.build_request(&messages, system_prompt.as_deref());

        Box::pin(async_stream::stream! {
            let response = match self.open(&request).await {
                Ok(resp) => resp,
                Err(e) => {
                    yield ModelChunk::Error(e);
                    return;
                }
            };

            let byte_stream = response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
            let mut reader = BufReader::new(StreamReader::new(byte_stream));
            let mut line = String::new();
            let mut usage = None;

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => match parse_sse_line(&line) {
                        SseLine::Skip => {}
                        SseLine::Done => break,
                        SseLine::Chunk(chunk) => {
                            for choice in chunk.choices {
                                if let Some(content) = choice.delta.content {
                                    if !content.is_empty() {
                                        yield ModelChunk::Text(content);
                                    }
                                }
                            }
                            if let Some(u) = chunk.usage {
                                usage = Some(TokenUsage {
                                    input_tokens: u.prompt_tokens,
                                    output_tokens: u.completion_tokens,
                                });
                            }
                        }
                        SseLine::Invalid(e) => warn!("Failed to parse SSE chunk: {}", e),
                    },
                    Err(e) => {
                        yield ModelChunk::Error(ProviderError::Stream(e.to_string()));
                        return;
                    }
                }
            }

            if let Some(usage) = usage {
                debug!("openai usage: {} in / {} out", usage.input_tokens, usage.output_tokens);
                yield ModelChunk::Usage(usage);
            }
            yield ModelChunk::Done;
        })
    }
}

// ============================================================================
// SSE line parsing
// ============================================================================

#[derive(Debug)]
enum SseLine {
    Skip,
    Done,
    Chunk(StreamChunk),
    Invalid(String),
}

fn parse_sse_line(raw: &str) -> SseLine {
    let line = raw.trim();
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        // event:/id: 등은 Chat Completions에서 의미 없음
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => SseLine::Chunk(chunk),
        Err(e) => SseLine::Invalid(format!("{} - data: {}", e, data)),
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new("sk-test", "gpt-4o", 512).unwrap()
    }

    #[test]
    fn test_build_request_roles() {
        let mut results = Message::tool_results(vec![]);
        results.content = "{\"call_id\":\"call_1_1\"}".to_string();
        let history = vec![
            Message::system("ignored"),
            Message::user("hello"),
            Message::assistant("calling"),
            results,
        ];

        let request = provider().build_request(&history, Some("preamble"));
        let roles: Vec<&str> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(request.messages[0].content, "preamble");
        assert!(request.stream);

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_sse_lines() {
        assert!(matches!(parse_sse_line("\n"), SseLine::Skip));
        assert!(matches!(parse_sse_line(": keep-alive\n"), SseLine::Skip));
        assert!(matches!(parse_sse_line("data: [DONE]\n"), SseLine::Done));
        assert!(matches!(parse_sse_line("data: {oops\n"), SseLine::Invalid(_)));

        match parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#) {
            SseLine::Chunk(chunk) => assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi")),
            other => panic!("unexpected {:?}", other),
        }
        match parse_sse_line(r#"data:{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":5}}"#) {
            SseLine::Chunk(chunk) => assert_eq!(chunk.usage.map(|u| u.completion_tokens), Some(5)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_response() {
        let err = OpenAiProvider::parse_error_response(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Incorrect API key","code":"invalid_api_key"}}"#,
        );
        assert_eq!(err, ProviderError::Authentication("Incorrect API key".into()));

        let err = OpenAiProvider::parse_error_response(reqwest::StatusCode::BAD_GATEWAY, "<html>");
        assert!(matches!(err, ProviderError::ServerError(_)));
    }

    #[test]
    fn test_from_settings_requires_key() {
        let settings = ModelSettings {
            api_key_env: "SKEIN_TEST_KEY_THAT_IS_NOT_SET".into(),
            ..Default::default()
        };
        assert!(matches!(
            OpenAiProvider::from_settings(&settings),
            Err(ProviderError::NotConfigured(_))
        ));
    }
}
