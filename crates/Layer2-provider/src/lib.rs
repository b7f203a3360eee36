//! # skein-provider
//!
//! 모델 provider 추상화 레이어.
//! 턴 루프는 모델을 불투명한 스트리밍 completion 서비스로만 본다.
//!
//! ## Features
//! - SSE streaming (OpenAI 호환 Chat Completions)
//! - 연결 단계 재시도 (exponential backoff)
//! - 테스트/데모용 scripted provider

pub mod error;
pub mod providers;
pub mod retry;
pub mod r#trait;

use skein_foundation::ModelSettings;
use std::sync::Arc;

// Core traits and types
pub use r#trait::{ChunkStream, ModelChunk, Provider};

// Error and retry
pub use error::ProviderError;
pub use retry::RetryConfig;

// Provider implementations
pub use providers::openai::OpenAiProvider;
pub use providers::scripted::{ScriptedProvider, ScriptedRequest};

/// 설정의 `model` 섹션으로 provider 생성
pub fn from_settings(settings: &ModelSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider = OpenAiProvider::from_settings(settings)?;
    tracing::info!("Using model {} at {}", provider.model(), settings.base_url);
    Ok(Arc::new(provider))
}
