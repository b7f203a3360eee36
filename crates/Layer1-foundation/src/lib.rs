//! # skein-foundation
//!
//! Foundation layer for skein:
//! - Core: 핵심 Trait 정의 (Tool, ToolHandler, ToolContext) 및 데이터 모델
//! - Config: 통합 설정 (SkeinConfig, 도구 선택, 게이트웨이 제공자)
//! - Error: 에러 분류 체계
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Thread Manager (Layer3)                                │
//! │     │ model chunks          ▲ ToolResult                │
//! │     ▼                       │                           │
//! │  Call Parser ──► ToolCallRequest ──► Execution Engine   │
//! │                                        │                │
//! │                        Tool Registry ◄─┘                │
//! │                        ├── Builtin (files, control)     │
//! │                        └── Gateway (stdio, sse)         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core (핵심 Trait 및 타입)
// ============================================================================
pub use core::{
    // Types - Message & Role
    Message,
    MessageRole,
    // Types - Tool Call / Result
    CallDialect,
    ToolCallRequest,
    ToolErrorKind,
    ToolFailure,
    ToolResult,
    // Types - Token
    TokenUsage,
    // Traits - Tool
    MarkupParam,
    MarkupSchema,
    Tool,
    ToolContext,
    ToolHandler,
    ToolMethod,
    ToolOutput,
};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    ExecutionStrategy, GatewayProviderConfig, GatewaySettings, ModelSettings, RelaySettings,
    RuntimeSettings, SkeinConfig, ToolSelection, TransportConfig, CONFIG_DIR_NAME,
};
