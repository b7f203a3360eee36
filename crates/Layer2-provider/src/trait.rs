//! Provider trait and common types
//!
//! 모델은 불투명한 스트리밍 completion 서비스로 취급한다.
//! 도구 호출은 모델 출력 텍스트 안의 호출 문법으로만 표현되므로
//! provider는 텍스트 조각과 사용량만 흘려보낸다.
//!
//! ## 타입 의존성
//!
//! - `Message`, `TokenUsage`: Layer1-foundation 표준 타입
//! - `ModelChunk`: 이 레이어 고유 정의 (ProviderError 포함)

use crate::error::ProviderError;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use skein_foundation::{Message, TokenUsage};
use std::pin::Pin;

/// 스트리밍 중 방출되는 조각
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    /// Text content delta
    Text(String),

    /// Token usage update
    Usage(TokenUsage),

    /// 이번 턴의 출력 끝
    Done,

    /// 스트림은 여기서 끝난다
    Error(ProviderError),
}

/// 모델 스트림 타입
pub type ChunkStream<'a> = Pin<Box<dyn Stream<Item = ModelChunk> + Send + 'a>>;

/// Model provider trait
///
/// 런마다 의존성으로 주입된다 (프로세스 전역 클라이언트 없음).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider id (e.g., "openai", "scripted")
    fn name(&self) -> &str;

    /// Model id used for requests
    fn model(&self) -> &str;

    /// Stream a completion for the given history
    ///
    /// `Done` 또는 `Error` 이후에는 아무것도 방출하지 않는다.
    /// 둘 다 없이 스트림이 끝나면 호출자는 `Done`으로 취급한다.
    fn stream(&self, messages: Vec<Message>, system_prompt: Option<String>) -> ChunkStream<'_>;

    /// Collect a full completion (non-streaming convenience)
    async fn complete(
        &self,
        messages: Vec<Message>,
        system_prompt: Option<String>,
    ) -> Result<String, ProviderError> {
        let mut stream = self.stream(messages, system_prompt);
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                ModelChunk::Text(delta) => text.push_str(&delta),
                ModelChunk::Usage(_) => {}
                ModelChunk::Done => break,
                ModelChunk::Error(e) => return Err(e),
            }
        }
        Ok(text)
    }
}
