//! Thread Manager - 턴 루프
//!
//! 한 턴:
//! 1. 스레드 전체 + 고정 프리앰블로 모델 컨텍스트 구성
//! 2. 모델 스트림을 받으면서 조각을 Call Parser에 먹이고, 호출 블록 밖의
//!    텍스트는 즉시 `assistant_delta`로 방출
//! 3. 호출이 없으면 assistant 메시지를 추가하고 `completed`
//! 4. 호출이 있으면 `tool_executing`으로 전이, Execution Engine 실행,
//!    tool 메시지 추가, 결과마다 `tool_result` 방출 후 다음 턴
//!    (terminal 결과가 있으면 종료)
//!
//! 파싱/모델 에러는 그 턴만 버리고 런을 `failed`로 끝낸다 (이전 기록은 유지).
//! 취소는 루프 맨 위와 모델 스트림 도중/직후에 확인하며, 도구 실행은
//! 중간에 끊지 않는다. 어떤 경로로 끝나든 마지막 이벤트는 `done`이다.

use crate::relay::{EventKind, RunPublisher};
use crate::run::{AgentRun, RunOutcome, RunStatus};
use crate::thread::Thread;
use futures::StreamExt;
use serde_json::{json, Value};
use skein_core::{dialect_instructions, CallParser, ParseEvent, ToolExecutor, ToolRegistry};
use skein_foundation::{Error, Message, TokenUsage, ToolCallRequest, ToolContext};
use skein_provider::{ModelChunk, Provider};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 기본 프리앰블 머리말
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that can call tools to act on the user's behalf. \
Use a tool only when it is needed, and answer in plain text when you are done.";

/// 한 턴이 끝난 뒤의 다음 단계
enum TurnStep {
    Continue,
    Completed(Option<String>),
    Failed(Error),
    Cancelled(String),
}

pub struct ThreadManager {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    max_turns: u32,
    preamble: String,
}

impl ThreadManager {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        executor: ToolExecutor,
        max_turns: u32,
    ) -> Self {
        let preamble = build_preamble(DEFAULT_SYSTEM_PROMPT, &registry);
        Self {
            provider,
            registry,
            executor,
            max_turns,
            preamble,
        }
    }

    /// 프리앰블 머리말 교체 (카탈로그와 호출 문법 설명은 항상 붙는다)
    pub fn with_system_prompt(mut self, prompt: Option<&str>) -> Self {
        if let Some(prompt) = prompt {
            self.preamble = build_preamble(prompt, &self.registry);
        }
        self
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// 런 하나를 끝까지 실행 (`drive` + `conclude`)
    pub async fn run(
        &self,
        run: &AgentRun,
        thread: &mut Thread,
        publisher: &RunPublisher,
        ctx: Arc<dyn ToolContext>,
    ) -> RunOutcome {
        let outcome = self.drive(run, thread, publisher, ctx).await;
        self.conclude(run, publisher, outcome)
    }

    /// 종료 조건까지 턴을 돌린다. 실패했다면 `error` 이벤트까지만 방출하고,
    /// `done`과 종료 상태 전이는 `conclude`에 맡긴다.
    ///
    /// 호출자는 두 단계 사이에 스레드 쓰기 권한을 놓아야 한다. 그래야
    /// `done`을 본 구독자가 곧바로 다음 런을 시작할 수 있다.
    pub async fn drive(
        &self,
        run: &AgentRun,
        thread: &mut Thread,
        publisher: &RunPublisher,
        ctx: Arc<dyn ToolContext>,
    ) -> RunOutcome {
        info!(
            "Run {} started on thread {} ({} tools, max {} turns)",
            run.id(),
            run.thread_id(),
            self.registry.len(),
            self.max_turns
        );
        if let Err(e) = run.transition(RunStatus::Running) {
            warn!("Run {} could not start: {}", run.id(), e);
        }

        let mut usage = TokenUsage::default();
        let mut turns = 0u32;

        let step = loop {
            if run.is_cancel_requested() {
                break TurnStep::Cancelled(format!("cancelled before turn {}", turns + 1));
            }
            if turns >= self.max_turns {
                break TurnStep::Failed(Error::TurnLimitExceeded {
                    max_turns: self.max_turns,
                });
            }

            turns += 1;
            run.set_turn(turns);

            match self.turn(run, thread, publisher, &ctx, turns, &mut usage).await {
                TurnStep::Continue => {}
                finished => break finished,
            }
        };

        match step {
            TurnStep::Completed(reason) => RunOutcome {
                reason,
                ..RunOutcome::completed(turns)
            },
            TurnStep::Failed(err) => {
                warn!("Run {} failed on turn {}: {}", run.id(), turns, err);
                self.publish(publisher, EventKind::Error, error_payload(&err, turns));
                RunOutcome::failed(turns, err.to_string())
            }
            TurnStep::Cancelled(reason) => {
                info!("Run {} {}", run.id(), reason);
                RunOutcome::cancelled(turns, reason)
            }
            TurnStep::Continue => RunOutcome::failed(turns, "turn loop ended without a result"),
        }
        .with_usage(usage)
    }

    /// 마지막 `done` 이벤트 방출 후 종료 상태로 전이
    pub fn conclude(
        &self,
        run: &AgentRun,
        publisher: &RunPublisher,
        outcome: RunOutcome,
    ) -> RunOutcome {
        self.publish(publisher, EventKind::Done, done_payload(&outcome));
        if let Err(e) = run.finish(outcome.clone()) {
            warn!("Run {} could not record outcome: {}", run.id(), e);
        }
        info!(
            "Run {} finished: {} after {} turns",
            run.id(),
            outcome.status,
            outcome.turns
        );
        outcome
    }

    async fn turn(
        &self,
        run: &AgentRun,
        thread: &mut Thread,
        publisher: &RunPublisher,
        ctx: &Arc<dyn ToolContext>,
        turn: u32,
        usage: &mut TokenUsage,
    ) -> TurnStep {
        debug!("Run {} turn {}", run.id(), turn);

        let mut parser = CallParser::new(turn).with_registry(Arc::clone(&self.registry));
        let mut stream = self
            .provider
            .stream(thread.messages().to_vec(), Some(self.preamble.clone()));
        let cancel = run.cancellation_token();

        // raw: 블록 포함 전체 출력 (스레드에 기록), text: 블록 밖 텍스트
        let mut raw = String::new();
        let mut text = String::new();
        let mut calls: Vec<ToolCallRequest> = Vec::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return TurnStep::Cancelled(format!("cancelled during turn {}", turn));
                }
                chunk = stream.next() => chunk,
            };

            match chunk {
                None | Some(ModelChunk::Done) => break,
                Some(ModelChunk::Usage(u)) => usage.add(&u),
                Some(ModelChunk::Error(e)) => return TurnStep::Failed(e.into()),
                Some(ModelChunk::Text(delta)) => {
                    raw.push_str(&delta);
                    match parser.feed(&delta) {
                        Ok(events) => self.route(events, publisher, turn, &mut text, &mut calls),
                        Err(e) => return TurnStep::Failed(e.into()),
                    }
                }
            }
        }
        drop(stream);

        match parser.finish() {
            Ok(events) => self.route(events, publisher, turn, &mut text, &mut calls),
            Err(e) => return TurnStep::Failed(e.into()),
        }

        // 스트림 동안 들어온 취소: 파싱된 호출은 실행하지 않고 턴을 버린다
        if run.is_cancel_requested() {
            return TurnStep::Cancelled(format!("cancelled during turn {}", turn));
        }

        if calls.is_empty() {
            thread.append(Message::assistant(raw));
            self.publish(
                publisher,
                EventKind::AssistantMessage,
                json!({ "turn": turn, "content": text }),
            );
            return TurnStep::Completed(None);
        }

        thread.append(Message::assistant_with_calls(raw, calls.clone()));
        if let Err(e) = run.transition(RunStatus::ToolExecuting) {
            return TurnStep::Failed(e);
        }

        let outcome = self
            .executor
            .execute(&self.registry, &calls, Arc::clone(ctx))
            .await;
        debug!(
            "Run {} turn {}: {} calls, {} ok, {} failed in {}ms",
            run.id(),
            turn,
            outcome.stats.total_calls,
            outcome.stats.successful,
            outcome.stats.failed,
            outcome.stats.total_duration_ms
        );

        thread.append(Message::tool_results(outcome.results.clone()));
        for result in &outcome.results {
            let payload = serde_json::to_value(result).unwrap_or_else(|e| {
                json!({ "call_id": result.call_id, "success": result.success, "error": e.to_string() })
            });
            self.publish(publisher, EventKind::ToolResult, payload);
        }

        if let Some(terminal) = outcome.terminal_result() {
            if terminal.success {
                return TurnStep::Completed(Some(format!("terminal tool {}", terminal.tool_name)));
            }
            let message = terminal
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            return TurnStep::Failed(Error::tool_execution(&terminal.tool_name, message));
        }

        match run.transition(RunStatus::Running) {
            Ok(()) => TurnStep::Continue,
            Err(e) => TurnStep::Failed(e),
        }
    }

    fn route(
        &self,
        events: Vec<ParseEvent>,
        publisher: &RunPublisher,
        turn: u32,
        text: &mut String,
        calls: &mut Vec<ToolCallRequest>,
    ) {
        for event in events {
            match event {
                ParseEvent::Text(fragment) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    text.push_str(&fragment);
                    self.publish(
                        publisher,
                        EventKind::AssistantDelta,
                        json!({ "turn": turn, "text": fragment }),
                    );
                }
                ParseEvent::Call(call) => {
                    debug!("Parsed call {} -> {}", call.call_id, call.name);
                    calls.push(call);
                }
            }
        }
    }

    fn publish(&self, publisher: &RunPublisher, kind: EventKind, payload: Value) {
        if let Err(e) = publisher.emit(kind, payload) {
            warn!("Dropping {} event: {}", kind, e);
        }
    }
}

/// 고정 프리앰블: 머리말 + 도구 카탈로그 + 호출 문법
pub fn build_preamble(system_prompt: &str, registry: &ToolRegistry) -> String {
    let mut preamble = String::from(system_prompt.trim_end());
    if registry.is_empty() {
        return preamble;
    }
    preamble.push_str("\n\n# Tools\n\n");
    preamble.push_str(&registry.render_catalogue());
    preamble.push_str("# Calling tools\n\n");
    preamble.push_str(&dialect_instructions());
    preamble
}

/// 에러 이벤트 페이로드 (도구 내부 상세는 싣지 않는다)
pub(crate) fn error_payload(err: &Error, turn: u32) -> Value {
    json!({
        "kind": error_kind(err),
        "message": err.to_string(),
        "turn": turn,
    })
}

pub(crate) fn done_payload(outcome: &RunOutcome) -> Value {
    json!({
        "status": outcome.status,
        "reason": outcome.reason,
        "turns": outcome.turns,
        "usage": outcome.usage,
    })
}

fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::Parse(_) => "parse_error",
        Error::TurnLimitExceeded { .. } => "turn_limit_exceeded",
        Error::Model(_) => "model_error",
        Error::ToolExecution { .. } => "tool_execution_error",
        Error::InvalidTransition { .. } => "invalid_transition",
        _ => "internal_error",
    }
}
