//! Core Module - 핵심 인터페이스 및 타입
//!
//! ## 타입 계층
//!
//! - `types.rs`: 데이터 타입 (Message, ToolCallRequest, ToolResult, TokenUsage)
//! - `traits.rs`: 인터페이스 (Tool, ToolHandler, ToolContext)
//!
//! ## 도구 유형
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Tool Registry                           │
//! │  ┌─────────────────┐  ┌─────────────────┐                   │
//! │  │  Built-in Tools │  │ Gateway Tools   │                   │
//! │  │  ├── files      │  │  mcp_{p}_{tool} │                   │
//! │  │  └── control    │  │                 │                   │
//! │  └────────┬────────┘  └────────┬────────┘                   │
//! │           └────────┬───────────┘                            │
//! │                    ▼                                        │
//! │           ToolSpecification (이름, 스키마, 핸들러)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod traits;
pub mod types;

// ============================================================================
// Types - 데이터 타입 (types.rs)
// ============================================================================

// Message & Role
pub use types::{Message, MessageRole};

// Tool Call / Result
pub use types::{CallDialect, ToolCallRequest, ToolErrorKind, ToolFailure, ToolResult};

// Token
pub use types::TokenUsage;

// ============================================================================
// Traits - 인터페이스 (traits.rs)
// ============================================================================

pub use traits::{
    MarkupParam, MarkupSchema, Tool, ToolContext, ToolHandler, ToolMethod, ToolOutput,
};
