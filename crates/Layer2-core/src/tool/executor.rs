//! Tool Executor - 한 턴의 도구 호출 실행
//!
//! - `Sequential`: 선언 순서대로 하나씩 실행. terminal 도구 이후의 호출은
//!   실행하지 않고 `skipped` 실패 결과로 채운다.
//! - `Parallel`: 모든 호출을 동시에 디스패치 (세마포어로 동시 실행 수 제한),
//!   완료 순서와 무관하게 선언 순서로 재배열해서 돌려준다.
//!
//! 각 호출은 별도 태스크에서 실행되므로 핸들러의 에러/패닉/타임아웃은
//! 해당 호출의 실패 결과로만 남고 형제 호출에 영향을 주지 않는다.
//! 반환되는 결과 수는 항상 요청 수와 같다.

use super::registry::ToolRegistry;
use futures::stream::{FuturesUnordered, StreamExt};
use skein_foundation::{
    Error, ExecutionStrategy, RuntimeSettings, ToolCallRequest, ToolContext, ToolErrorKind,
    ToolResult,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// 실행 설정
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub strategy: ExecutionStrategy,
    /// 최대 동시 실행 수
    pub max_concurrency: usize,
    /// 호출 하나의 제한 시간
    pub tool_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            strategy: ExecutionStrategy::Parallel,
            max_concurrency: 4,
            tool_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&RuntimeSettings> for ExecutorConfig {
    fn from(settings: &RuntimeSettings) -> Self {
        Self {
            strategy: settings.strategy,
            max_concurrency: settings.max_concurrency.max(1),
            tool_timeout: settings.tool_timeout(),
        }
    }
}

/// 실행 통계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub total_calls: usize,
    pub successful: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub total_duration_ms: u64,
}

/// 한 턴의 실행 결과
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// 요청 선언 순서와 같은 순서
    pub results: Vec<ToolResult>,
    pub stats: ExecutionStats,
}

impl TurnOutcome {
    /// 선언 순서상 첫 번째 terminal 결과
    pub fn terminal_result(&self) -> Option<&ToolResult> {
        self.results.iter().find(|r| r.terminal)
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_result().is_some()
    }
}

/// 도구 실행기
pub struct ToolExecutor {
    config: ExecutorConfig,
    semaphore: Arc<Semaphore>,
}

impl ToolExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self { config, semaphore }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// 한 턴의 호출 실행
    pub async fn execute(
        &self,
        registry: &Arc<ToolRegistry>,
        calls: &[ToolCallRequest],
        ctx: Arc<dyn ToolContext>,
    ) -> TurnOutcome {
        let start = Instant::now();

        info!(
            "Executing {} tool calls ({} strategy)",
            calls.len(),
            self.config.strategy
        );

        let results = match self.config.strategy {
            ExecutionStrategy::Sequential => self.execute_sequential(registry, calls, ctx).await,
            ExecutionStrategy::Parallel => self.execute_parallel(registry, calls, ctx).await,
        };

        let mut stats = ExecutionStats {
            total_calls: results.len(),
            ..Default::default()
        };
        for result in &results {
            if result.success {
                stats.successful += 1;
            } else {
                stats.failed += 1;
                if result.error_kind() == Some(ToolErrorKind::Timeout) {
                    stats.timed_out += 1;
                }
            }
        }
        stats.total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Tool execution completed: {} total, {} success, {} failed, {} timed out, {}ms",
            stats.total_calls,
            stats.successful,
            stats.failed,
            stats.timed_out,
            stats.total_duration_ms
        );

        TurnOutcome { results, stats }
    }

    async fn execute_sequential(
        &self,
        registry: &Arc<ToolRegistry>,
        calls: &[ToolCallRequest],
        ctx: Arc<dyn ToolContext>,
    ) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        let mut terminated_by: Option<String> = None;

        for call in calls {
            if let Some(by) = &terminated_by {
                results.push(ToolResult::failure(
                    call,
                    ToolErrorKind::Skipped,
                    format!("not executed: run ended by {}", by),
                ));
                continue;
            }

            let handle = self.spawn_invocation(registry, call, &ctx);
            let result = join_invocation(registry, call, handle.await);
            if result.terminal {
                debug!("Terminal call {} short-circuits the turn", call.call_id);
                terminated_by = Some(call.call_id.clone());
            }
            results.push(result);
        }

        results
    }

    async fn execute_parallel(
        &self,
        registry: &Arc<ToolRegistry>,
        calls: &[ToolCallRequest],
        ctx: Arc<dyn ToolContext>,
    ) -> Vec<ToolResult> {
        let mut pending: FuturesUnordered<_> = calls
            .iter()
            .enumerate()
            .map(|(index, call)| {
                let handle = self.spawn_invocation(registry, call, &ctx);
                async move { (index, handle.await) }
            })
            .collect();

        // 완료 순서대로 받아 선언 위치에 채운다
        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        while let Some((index, joined)) = pending.next().await {
            slots[index] = Some(join_invocation(registry, &calls[index], joined));
        }

        slots
            .into_iter()
            .zip(calls)
            .map(|(slot, call)| {
                slot.unwrap_or_else(|| {
                    ToolResult::failure(call, ToolErrorKind::Execution, "result was lost")
                })
            })
            .collect()
    }

    fn spawn_invocation(
        &self,
        registry: &Arc<ToolRegistry>,
        call: &ToolCallRequest,
        ctx: &Arc<dyn ToolContext>,
    ) -> tokio::task::JoinHandle<ToolResult> {
        let registry = Arc::clone(registry);
        let ctx = Arc::clone(ctx);
        let semaphore = Arc::clone(&self.semaphore);
        let timeout = self.config.tool_timeout;
        let call = call.clone();

        tokio::spawn(async move {
            // 세마포어는 닫지 않으므로 acquire 실패는 없다
            let _permit = semaphore.acquire_owned().await.ok();
            invoke(&registry, &call, ctx.as_ref(), timeout).await
        })
    }
}

/// 태스크 결과 → ToolResult
///
/// 패닉은 핸들러가 실패한 것과 같게 취급한다. terminal 도구라면 결과도 terminal.
fn join_invocation(
    registry: &ToolRegistry,
    call: &ToolCallRequest,
    joined: std::result::Result<ToolResult, tokio::task::JoinError>,
) -> ToolResult {
    match joined {
        Ok(result) => result,
        Err(e) => {
            warn!("Tool '{}' ({}) panicked: {}", call.name, call.call_id, e);
            let terminal = registry.get(&call.name).is_some_and(|spec| spec.terminal);
            ToolResult::failure(call, ToolErrorKind::Execution, "tool invocation panicked")
                .with_terminal(terminal)
        }
    }
}

/// 호출 하나: 해석 → 검증 → 실행(타임아웃)
async fn invoke(
    registry: &ToolRegistry,
    call: &ToolCallRequest,
    ctx: &dyn ToolContext,
    timeout: Duration,
) -> ToolResult {
    let start = Instant::now();

    let spec = match registry.resolve(&call.name) {
        Ok(spec) => spec,
        Err(e) => {
            debug!("{}", e);
            return ToolResult::failure(call, ToolErrorKind::UnknownTool, e.to_string());
        }
    };

    if let Err(message) = spec.validate(&call.arguments) {
        // 핸들러가 돌지 않았으므로 terminal 아님: 턴은 계속된다
        return ToolResult::failure(
            call,
            ToolErrorKind::Validation,
            Error::Validation(message).to_string(),
        );
    }

    let args = Value::Object(call.arguments.clone());
    let result = match tokio::time::timeout(timeout, spec.handler.invoke(args, ctx)).await {
        Ok(Ok(output)) if output.success => ToolResult::success(call, output.output),
        Ok(Ok(output)) => {
            let message = output
                .error
                .unwrap_or_else(|| "tool reported failure".to_string());
            let mut failed = ToolResult::failure(call, ToolErrorKind::Execution, message);
            failed.output = output.output;
            failed
        }
        Ok(Err(e)) => ToolResult::failure(
            call,
            ToolErrorKind::Execution,
            Error::tool_execution(&call.name, e.to_string()).to_string(),
        ),
        Err(_) => {
            warn!("Tool '{}' timed out after {:?}", call.name, timeout);
            ToolResult::failure(
                call,
                ToolErrorKind::Timeout,
                format!("Timeout after {}ms", timeout.as_millis()),
            )
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    debug!(
        "Tool '{}' ({}) finished in {}ms, success: {}",
        call.name, call.call_id, duration_ms, result.success
    );

    result
        .with_terminal(spec.terminal)
        .with_duration_ms(duration_ms)
}

// ============================================================================
// 테스트
// ============================================================================
