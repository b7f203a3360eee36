//! Tool System - 도구 레지스트리와 실행 엔진
//!
//! Layer1의 Tool / ToolHandler trait을 (이름, 스키마, 핸들러) 테이블로 묶고,
//! 한 턴의 호출 묶음을 실행합니다.
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ToolRegistry                                                │
//! │  ├── register(tool) - 메서드 테이블 등록                     │
//! │  ├── register_spec(spec) - 게이트웨이 도구 등록              │
//! │  ├── resolve(name) - 이름 → 핸들러                           │
//! │  └── enabled_set(selection) - 런별 부분집합                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ToolExecutor                                                │
//! │  ├── Sequential - 선언 순서, terminal 이후 skip              │
//! │  └── Parallel - 동시 디스패치, 선언 순서로 재배열            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Builtin Tools                                               │
//! │  ├── FilesTool - list_files / read_file                      │
//! │  └── ControlTool - complete (terminal)                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 사용법
//!
//! ```ignore
//! let registry = Arc::new(ToolRegistry::with_builtins()?);
//! let ctx: Arc<dyn ToolContext> = Arc::new(RuntimeContext::new(run_id, thread_id, cwd));
//!
//! let executor = ToolExecutor::new(ExecutorConfig::from(&config.runtime));
//! let outcome = executor.execute(&registry, &calls, ctx).await;
//! ```

pub mod builtin;
mod context;
mod executor;
mod registry;
mod schema;

pub use builtin::{all_tools, ControlTool, FilesTool};
pub use context::RuntimeContext;
pub use executor::{ExecutionStats, ExecutorConfig, ToolExecutor, TurnOutcome};
pub use registry::ToolRegistry;
pub use schema::{coerce_text, ToolSource, ToolSpecification};

// Layer1 trait re-export
pub use skein_foundation::{Tool, ToolContext, ToolHandler, ToolMethod, ToolOutput};
