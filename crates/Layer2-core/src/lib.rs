//! skein-core: 도구 레이어
//!
//! Layer2 - 호출 파싱, 도구 등록/실행, 외부 도구 게이트웨이
//!
//! # 주요 모듈
//!
//! - `tool`: Schema/Tool Registry, Execution Engine, builtin 도구
//! - `parser`: 두 가지 호출 문법을 하나의 `ToolCallRequest`로 (스트리밍)
//! - `mcp`: Dynamic Tool Gateway (stdio / SSE 제공자)
//! - `config`: 설정 파일 로더
//!
//! # 사용 예시
//!
//! ```ignore
//! use skein_core::{CallParser, ToolExecutor, ToolGateway, ToolRegistry};
//!
//! let mut registry = ToolRegistry::with_builtins()?;
//! ToolGateway::new(config.gateway.clone())
//!     .register_into(&mut registry)
//!     .await?;
//! let registry = Arc::new(registry.enabled_set(&config.tools));
//!
//! let mut parser = CallParser::new(1).with_registry(registry.clone());
//! for chunk in chunks {
//!     for event in parser.feed(&chunk)? { /* ... */ }
//! }
//!
//! let outcome = ToolExecutor::new((&config.runtime).into())
//!     .execute(&registry, &calls, ctx)
//!     .await;
//! ```

pub mod config;
pub mod mcp;
pub mod parser;
pub mod tool;

// Re-exports: Tool
pub use tool::{
    all_tools, ControlTool, ExecutionStats, ExecutorConfig, FilesTool, RuntimeContext,
    ToolExecutor, ToolRegistry, ToolSource, ToolSpecification, TurnOutcome,
};

// Re-exports: Parser
pub use parser::{dialect_instructions, CallParser, ParseError, ParseEvent, RawCall};

// Re-exports: Gateway
pub use mcp::{GatewayReport, McpClient, ProviderConnector, ToolGateway};

// Re-exports: Config
pub use config::ConfigLoader;

// Layer1 re-exports
pub use skein_foundation::{Error, Result};

/// Layer2 버전
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
