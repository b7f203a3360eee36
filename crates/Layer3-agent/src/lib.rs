//! # skein-agent
//!
//! Layer3 - 에이전트 런타임
//!
//! 스레드 하나에 대해 모델 호출과 도구 실행을 번갈아 돌리는 턴 루프,
//! 그리고 그 과정을 여러 구독자에게 순서대로 흘려보내는 릴레이.
//!
//! ## 핵심 컴포넌트
//!
//! - **Thread**: append-only 대화 기록, 런 하나만 쓰기 권한을 가진다
//! - **AgentRun**: `pending → running ⇄ tool_executing → completed | failed | cancelled`
//! - **ThreadManager**: 턴 루프 (모델 스트림 → Call Parser → Execution Engine)
//! - **StreamRelay**: 런별 백로그 + 구독자별 커서/큐
//! - **AgentRuntime**: 활성 런 레지스트리, 취소, 백로그 정리
//!
//! ## 사용 예
//!
//! ```ignore
//! use skein_agent::{AgentRuntime, Delivery, RunOptions};
//!
//! let runtime = Arc::new(AgentRuntime::new(config, registry, provider));
//! let thread_id = runtime.create_thread();
//! runtime.append_user_message(&thread_id, "list the workspace")?;
//!
//! let run_id = runtime.start_run(&thread_id, RunOptions::default())?;
//! let mut sub = runtime.subscribe(&run_id, 0)?;
//! while let Some(delivery) = sub.recv().await {
//!     match delivery {
//!         Delivery::Event(event) => print!("{}", event.to_line()),
//!         Delivery::Gap { .. } => sub = sub.resubscribe()?,
//!     }
//! }
//! ```

pub mod manager;
pub mod relay;
pub mod run;
pub mod runtime;
pub mod thread;

pub use manager::{build_preamble, ThreadManager, DEFAULT_SYSTEM_PROMPT};
pub use relay::{Delivery, EventKind, RunPublisher, StreamEvent, StreamRelay, Subscription};
pub use run::{AgentRun, RunOutcome, RunStatus};
pub use runtime::{AgentRuntime, RunOptions};
pub use thread::{Thread, ThreadGuard, ThreadStore};

// Layer1 re-exports
pub use skein_foundation::{Error, Result};
