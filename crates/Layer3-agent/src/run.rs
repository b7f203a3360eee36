//! AgentRun - 런 상태 기계
//!
//! ```text
//! pending ──► running ──► tool_executing ──► running ──► ...
//!    │           │               │
//!    └───────────┴───────────────┴──► completed | failed | cancelled
//! ```
//!
//! 상태는 `watch` 채널로 공개되어 호출자가 이벤트 구독 없이 종료를
//! 기다릴 수 있다. 취소는 `CancellationToken`으로 요청하고, 턴 루프가
//! 루프 맨 위와 모델 스트림 직후에만 확인한다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skein_foundation::{Error, Result, TokenUsage};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// RunStatus
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    /// 한 턴의 도구 실행 중 (일시적인 하위 상태)
    ToolExecuting,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Running, ToolExecuting) => true,
            (ToolExecuting, Running) => true,
            (Pending | Running | ToolExecuting, Completed | Failed | Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::ToolExecuting => "tool_executing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RunOutcome
// ============================================================================

/// 런 종료 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// 실패/취소 이유 또는 terminal 도구 이름
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub turns: u32,
    #[serde(default)]
    pub usage: TokenUsage,
}

impl RunOutcome {
    pub fn completed(turns: u32) -> Self {
        Self {
            status: RunStatus::Completed,
            reason: None,
            turns,
            usage: TokenUsage::default(),
        }
    }

    pub fn failed(turns: u32, reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            reason: Some(reason.into()),
            turns,
            usage: TokenUsage::default(),
        }
    }

    pub fn cancelled(turns: u32, reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Cancelled,
            reason: Some(reason.into()),
            turns,
            usage: TokenUsage::default(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

// ============================================================================
// AgentRun
// ============================================================================

/// 실행 중인 런 하나
pub struct AgentRun {
    id: String,
    thread_id: String,
    created_at: DateTime<Utc>,
    turn: AtomicU32,
    cancel: CancellationToken,
    status_tx: watch::Sender<RunStatus>,
    outcome_tx: watch::Sender<Option<RunOutcome>>,
}

impl AgentRun {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), thread_id)
    }

    pub fn with_id(id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        let (status_tx, _) = watch::channel(RunStatus::Pending);
        let (outcome_tx, _) = watch::channel(None);
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            created_at: Utc::now(),
            turn: AtomicU32::new(0),
            cancel: CancellationToken::new(),
            status_tx,
            outcome_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> RunStatus {
        *self.status_tx.borrow()
    }

    pub fn turn(&self) -> u32 {
        self.turn.load(Ordering::SeqCst)
    }

    pub(crate) fn set_turn(&self, turn: u32) {
        self.turn.store(turn, Ordering::SeqCst);
    }

    /// 취소 요청 (협력적, 진행 중인 도구는 끝까지 실행된다)
    pub fn cancel(&self) {
        if !self.status().is_terminal() {
            debug!("Cancellation requested for run {}", self.id);
        }
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 상태 전이. 허용되지 않은 전이는 `InvalidTransition`.
    pub fn transition(&self, next: RunStatus) -> Result<()> {
        let mut result = Ok(());
        self.status_tx.send_modify(|current| {
            if current.can_transition_to(next) {
                debug!("Run {}: {} -> {}", self.id, current, next);
                *current = next;
            } else {
                result = Err(Error::InvalidTransition {
                    from: current.to_string(),
                    to: next.to_string(),
                });
            }
        });
        result
    }

    /// 종료 상태로 전이하고 결과를 공개
    pub(crate) fn finish(&self, outcome: RunOutcome) -> Result<()> {
        self.transition(outcome.status)?;
        self.outcome_tx.send_replace(Some(outcome));
        Ok(())
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome_tx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<RunStatus> {
        self.status_tx.subscribe()
    }

    /// 종료될 때까지 대기
    pub async fn wait(&self) -> RunOutcome {
        let mut rx = self.outcome_tx.subscribe();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            // sender는 self가 쥐고 있으므로 닫히지 않는다
            if rx.changed().await.is_err() {
                return RunOutcome::failed(self.turn(), "run dropped before finishing");
            }
        }
    }
}

impl fmt::Debug for AgentRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRun")
            .field("id", &self.id)
            .field("thread_id", &self.thread_id)
            .field("status", &self.status())
            .field("turn", &self.turn())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_state_machine() {
        let run = AgentRun::new("thread");
        assert_eq!(run.status(), RunStatus::Pending);
        assert!(run.transition(RunStatus::ToolExecuting).is_err());

        run.transition(RunStatus::Running).unwrap();
        run.transition(RunStatus::ToolExecuting).unwrap();
        run.transition(RunStatus::Running).unwrap();
        run.transition(RunStatus::Completed).unwrap();

        let err = run.transition(RunStatus::Running).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { ref from, .. } if from == "completed"));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [RunStatus::Running, RunStatus::Failed, RunStatus::Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[tokio::test]
    async fn test_wait_sees_outcome() {
        let run = Arc::new(AgentRun::new("thread"));
        let waiter = {
            let run = Arc::clone(&run);
            tokio::spawn(async move { run.wait().await })
        };

        run.transition(RunStatus::Running).unwrap();
        run.set_turn(2);
        run.finish(RunOutcome::completed(2)).unwrap();

        let outcome = waiter.await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.turns, 2);
        assert_eq!(run.status(), RunStatus::Completed);
    }

    #[test]
    fn test_cancel_flag() {
        let run = AgentRun::new("thread");
        let token = run.cancellation_token();
        assert!(!run.is_cancel_requested());
        run.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&RunStatus::ToolExecuting).unwrap(),
            "\"tool_executing\""
        );
    }
}
