//! Scripted provider - 미리 정한 턴별 출력을 재생
//!
//! 네트워크 없이 턴 루프를 결정적으로 구동하기 위한 provider.
//! 호출될 때마다 다음 턴 스크립트를 꺼내 조각 단위로 방출하고,
//! 받은 요청(히스토리, 시스템 프롬프트)은 기록해 둔다.

use crate::{
    error::ProviderError,
    r#trait::{ChunkStream, ModelChunk, Provider},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use skein_foundation::{Message, TokenUsage};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Step {
    Text(String),
    Fail(ProviderError),
}

/// 기록된 요청
#[derive(Debug, Clone)]
pub struct ScriptedRequest {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
}

pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Vec<Step>>>,
    /// 스크립트가 바닥나면 매번 이 턴을 재생
    repeat: Option<Vec<Step>>,
    chunk_delay: Option<Duration>,
    requests: Mutex<Vec<ScriptedRequest>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            repeat: None,
            chunk_delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 조각 목록으로 된 턴 하나 추가
    pub fn turn_text<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps = chunks.into_iter().map(|c| Step::Text(c.into())).collect();
        self.turns.lock().push_back(steps);
        self
    }

    /// 텍스트를 `size`자 단위로 잘라 턴 하나로 추가
    pub fn turn_chunked(self, text: &str, size: usize) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let chunks: Vec<String> = chars
            .chunks(size.max(1))
            .map(|c| c.iter().collect())
            .collect();
        self.turn_text(chunks)
    }

    /// 스트림 도중 실패하는 턴
    pub fn turn_error(self, error: ProviderError) -> Self {
        self.turns.lock().push_back(vec![Step::Fail(error)]);
        self
    }

    /// 일부 텍스트를 보낸 뒤 실패하는 턴
    pub fn turn_text_then_error<I, S>(self, chunks: I, error: ProviderError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut steps: Vec<Step> = chunks.into_iter().map(|c| Step::Text(c.into())).collect();
        steps.push(Step::Fail(error));
        self.turns.lock().push_back(steps);
        self
    }

    /// 스크립트가 바닥난 뒤 반복 재생할 턴
    pub fn repeat_text<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.repeat = Some(chunks.into_iter().map(|c| Step::Text(c.into())).collect());
        self
    }

    /// 조각 사이 지연 (취소 테스트용)
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// 지금까지 받은 요청
    pub fn requests(&self) -> Vec<ScriptedRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_turn(&self) -> Vec<Step> {
        if let Some(steps) = self.turns.lock().pop_front() {
            return steps;
        }
        match &self.repeat {
            Some(steps) => steps.clone(),
            None => vec![Step::Fail(ProviderError::InvalidRequest(
                "scripted provider has no turns left".to_string(),
            ))],
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn stream(&self, messages: Vec<Message>, system_prompt: Option<String>) -> ChunkStream<'_> {
        let input_tokens = messages.iter().map(|m| m.content.len() as u32 / 4).sum();
        self.requests.lock().push(ScriptedRequest {
            messages,
            system_prompt,
        });
        let steps = self.next_turn();
        let delay = self.chunk_delay;

        Box::pin(async_stream::stream! {
            let mut output_chars = 0u32;
            for step in steps {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                match step {
                    Step::Text(text) => {
                        output_chars += text.len() as u32;
                        yield ModelChunk::Text(text);
                    }
                    Step::Fail(e) => {
                        yield ModelChunk::Error(e);
                        return;
                    }
                }
            }
            yield ModelChunk::Usage(TokenUsage {
                input_tokens,
                output_tokens: output_chars / 4,
            });
            yield ModelChunk::Done;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(provider: &ScriptedProvider) -> Vec<ModelChunk> {
        provider
            .stream(vec![Message::user("hi")], Some("sys".into()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_turns_replay_in_order() {
        let provider = ScriptedProvider::new().turn_text(["a", "b"]).turn_chunked("hello", 2);

        let first = collect(&provider).await;
        assert_eq!(first[0], ModelChunk::Text("a".into()));
        assert_eq!(first[1], ModelChunk::Text("b".into()));
        assert_eq!(first.last(), Some(&ModelChunk::Done));

        let second: Vec<ModelChunk> = collect(&provider)
            .await
            .into_iter()
            .filter(|c| matches!(c, ModelChunk::Text(_)))
            .collect();
        assert_eq!(
            second,
            vec![
                ModelChunk::Text("he".into()),
                ModelChunk::Text("ll".into()),
                ModelChunk::Text("o".into())
            ]
        );

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].system_prompt.as_deref(), Some("sys"));
    }

    #[tokio::test]
    async fn test_exhausted_script_errors() {
        let provider = ScriptedProvider::new();
        let chunks = collect(&provider).await;
        assert!(matches!(chunks.as_slice(), [ModelChunk::Error(ProviderError::InvalidRequest(_))]));
    }

    #[tokio::test]
    async fn test_repeat_and_error_after_text() {
        let provider = ScriptedProvider::new()
            .turn_text_then_error(["partial"], ProviderError::Stream("reset".into()))
            .repeat_text(["again"]);

        let chunks = collect(&provider).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], ModelChunk::Error(ProviderError::Stream("reset".into())));

        for _ in 0..3 {
            let chunks = collect(&provider).await;
            assert_eq!(chunks[0], ModelChunk::Text("again".into()));
        }
        assert_eq!(provider.call_count(), 4);
    }

    #[test]
    fn test_complete_collects_text() {
        let provider = ScriptedProvider::new().turn_text(["par", "tial"]);
        let text = tokio_test::block_on(provider.complete(vec![Message::user("hi")], None)).unwrap();
        assert_eq!(text, "partial");
        assert_eq!(provider.call_count(), 1);
    }
}
