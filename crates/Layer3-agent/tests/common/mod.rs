//! 통합 테스트 공용 헬퍼

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use skein_agent::{
    AgentRuntime, Delivery, EventKind, RunOptions, RunOutcome, StreamEvent, Subscription,
};
use skein_core::ToolRegistry;
use skein_foundation::{Result, SkeinConfig, Tool, ToolContext, ToolMethod, ToolOutput};
use skein_provider::{Provider, ScriptedProvider};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn runtime(provider: &Arc<ScriptedProvider>, dir: &Path) -> AgentRuntime {
    runtime_with(provider, SkeinConfig::default(), builtins(), dir)
}

pub fn runtime_with(
    provider: &Arc<ScriptedProvider>,
    config: SkeinConfig,
    registry: ToolRegistry,
    dir: &Path,
) -> AgentRuntime {
    let provider: Arc<dyn Provider> = provider.clone();
    AgentRuntime::new(config, registry, provider).with_working_dir(dir)
}

pub fn builtins() -> ToolRegistry {
    ToolRegistry::with_builtins().unwrap()
}

/// ```tool_calls 블록
pub fn structured(calls: &[(&str, Value)]) -> String {
    let list: Vec<Value> = calls
        .iter()
        .map(|(name, args)| json!({ "name": name, "arguments": args }))
        .collect();
    format!("```tool_calls\n{}\n```", Value::Array(list))
}

/// 한 스레드에 사용자 메시지 하나를 넣고 런 시작
pub fn start(runtime: &AgentRuntime, prompt: &str, options: RunOptions) -> (String, String) {
    let thread_id = runtime.create_thread();
    runtime.append_user_message(&thread_id, prompt).unwrap();
    let run_id = runtime.start_run(&thread_id, options).unwrap();
    (thread_id, run_id)
}

pub async fn wait(runtime: &AgentRuntime, run_id: &str) -> RunOutcome {
    tokio::time::timeout(TIMEOUT, runtime.wait(run_id))
        .await
        .expect("run did not finish in time")
        .unwrap()
}

/// gap 없이 끝까지 받기
pub async fn drain(mut sub: Subscription) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    loop {
        let next = tokio::time::timeout(TIMEOUT, sub.recv())
            .await
            .expect("subscriber stalled");
        match next {
            Some(Delivery::Event(event)) => events.push(event),
            Some(Delivery::Gap { missed_after }) => panic!("unexpected gap after {}", missed_after),
            None => return events,
        }
    }
}

pub fn kinds(events: &[StreamEvent]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}

pub fn of_kind(events: &[StreamEvent], kind: EventKind) -> Vec<&StreamEvent> {
    events.iter().filter(|e| e.kind == kind).collect()
}

pub fn assert_contiguous(events: &[StreamEvent]) {
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as u64 + 1, "seq gap at index {}", i);
    }
    assert!(events.last().map(|e| e.is_done()).unwrap_or(false), "last event is not done");
}

// ============================================================================
// Test tools
// ============================================================================

/// 잠시 잠든 뒤 성공하는 도구 (취소 테스트용)
pub struct SlowTool {
    pub delay: Duration,
    pub started: AtomicUsize,
    pub finished: AtomicBool,
}

impl SlowTool {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            started: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
        })
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn methods(&self) -> Vec<ToolMethod> {
        vec![ToolMethod::new("slow_step")
            .description("Sleep, then succeed.")
            .schema(json!({ "type": "object", "properties": {} }))]
    }

    async fn call(&self, _method: &str, _args: Value, _ctx: &dyn ToolContext) -> Result<ToolOutput> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(ToolOutput::success(json!({ "slept_ms": self.delay.as_millis() as u64 })))
    }
}
