//! AgentRuntime - 활성 런 레지스트리
//!
//! 스레드, 런, 릴레이를 한곳에서 관리한다. 런 하나는 독립된 tokio 태스크에서
//! 돌고, 런이 끝날 때까지 스레드 쓰기 권한을 단독으로 쥔다.
//!
//! ```ignore
//! let runtime = Arc::new(AgentRuntime::new(config, registry, provider));
//! let janitor = runtime.spawn_janitor();
//!
//! let thread_id = runtime.create_thread();
//! runtime.append_user_message(&thread_id, "hello")?;
//! let run_id = runtime.start_run(&thread_id, RunOptions::default())?;
//!
//! let mut sub = runtime.subscribe(&run_id, 0)?;
//! while let Some(delivery) = sub.recv().await { /* ... */ }
//! ```

use crate::manager::{done_payload, error_payload, ThreadManager};
use crate::relay::{EventKind, StreamRelay, Subscription};
use crate::run::{AgentRun, RunOutcome, RunStatus};
use crate::thread::ThreadStore;
use parking_lot::RwLock;
use skein_core::{ExecutorConfig, RuntimeContext, ToolExecutor, ToolRegistry};
use skein_foundation::{
    Error, ExecutionStrategy, Message, Result, SkeinConfig, ToolContext, ToolSelection,
};
use skein_provider::Provider;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ============================================================================
// RunOptions
// ============================================================================

/// 런 하나에만 적용되는 설정 덮어쓰기
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// 도구 선택 (없으면 설정 파일의 `tools`)
    pub tools: Option<ToolSelection>,
    pub strategy: Option<ExecutionStrategy>,
    pub max_turns: Option<u32>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: ToolSelection) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }
}

// ============================================================================
// AgentRuntime
// ============================================================================

pub struct AgentRuntime {
    config: SkeinConfig,
    /// 게이트웨이 등록까지 끝난 전체 레지스트리 (런마다 `enabled_set`으로 좁힘)
    registry: Arc<ToolRegistry>,
    provider: Arc<dyn Provider>,
    threads: ThreadStore,
    relay: Arc<StreamRelay>,
    runs: RwLock<HashMap<String, Arc<AgentRun>>>,
    working_dir: PathBuf,
    shutdown: CancellationToken,
}

impl AgentRuntime {
    pub fn new(config: SkeinConfig, registry: ToolRegistry, provider: Arc<dyn Provider>) -> Self {
        let relay = Arc::new(StreamRelay::new(config.relay.clone()));
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config,
            registry: Arc::new(registry),
            provider,
            threads: ThreadStore::new(),
            relay,
            runs: RwLock::new(HashMap::new()),
            working_dir,
            shutdown: CancellationToken::new(),
        }
    }

    /// 도구가 상대 경로를 해석할 작업 디렉터리
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn config(&self) -> &SkeinConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn relay(&self) -> &Arc<StreamRelay> {
        &self.relay
    }

    // ========================================================================
    // Threads
    // ========================================================================

    pub fn create_thread(&self) -> String {
        let id = self.threads.create();
        debug!("Created thread {}", id);
        id
    }

    /// 런이 스레드를 쥐고 있으면 `ThreadBusy`
    pub fn append_user_message(&self, thread_id: &str, content: impl Into<String>) -> Result<()> {
        self.threads.append(thread_id, Message::user(content))
    }

    /// 메시지 사본 (활성 런이 있으면 끝날 때까지 기다린다)
    pub async fn thread_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        self.threads.snapshot(thread_id).await
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// 런 시작 후 런 id 반환
    ///
    /// 릴레이 채널은 반환 전에 열리므로 곧바로 `subscribe`해도 이벤트를
    /// 놓치지 않는다.
    pub fn start_run(&self, thread_id: &str, options: RunOptions) -> Result<String> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Internal("runtime is shutting down".to_string()));
        }

        let guard = self.threads.acquire(thread_id)?;

        let selection = options.tools.as_ref().unwrap_or(&self.config.tools);
        let registry = Arc::new(self.registry.enabled_set(selection));

        let mut executor_config = ExecutorConfig::from(&self.config.runtime);
        if let Some(strategy) = options.strategy {
            executor_config.strategy = strategy;
        }
        let max_turns = options.max_turns.unwrap_or(self.config.runtime.max_turns);

        let manager = ThreadManager::new(
            Arc::clone(&self.provider),
            registry,
            ToolExecutor::new(executor_config),
            max_turns,
        )
        .with_system_prompt(self.config.runtime.system_prompt.as_deref());

        let run = Arc::new(AgentRun::new(thread_id));
        let run_id = run.id().to_string();
        let publisher = Arc::new(self.relay.open(&run_id)?);
        self.runs.write().insert(run_id.clone(), Arc::clone(&run));

        let ctx: Arc<dyn ToolContext> = Arc::new(RuntimeContext::new(
            run_id.as_str(),
            thread_id,
            self.working_dir.clone(),
        ));

        let worker = {
            let run = Arc::clone(&run);
            let publisher = Arc::clone(&publisher);
            tokio::spawn(async move {
                let mut guard = guard;
                let outcome = manager.drive(&run, &mut guard, &publisher, ctx).await;
                drop(guard);
                manager.conclude(&run, &publisher, outcome);
            })
        };

        // 턴 루프가 패닉해도 구독자와 대기자는 종료를 본다
        tokio::spawn(async move {
            if let Err(e) = worker.await {
                error!("Run {} task aborted: {}", run.id(), e);
                let outcome = RunOutcome::failed(run.turn(), format!("run task aborted: {}", e));
                if !publisher.is_sealed() {
                    let err = Error::Internal(format!("run task aborted: {}", e));
                    let final_events = [
                        (EventKind::Error, error_payload(&err, run.turn())),
                        (EventKind::Done, done_payload(&outcome)),
                    ];
                    for (kind, payload) in final_events {
                        if let Err(e) = publisher.emit(kind, payload) {
                            warn!("Dropping {} event for run {}: {}", kind, run.id(), e);
                        }
                    }
                }
                if !run.status().is_terminal() {
                    if let Err(e) = run.finish(outcome) {
                        warn!("Could not mark run {} failed: {}", run.id(), e);
                    }
                }
            }
        });

        info!("Started run {} on thread {}", run_id, thread_id);
        Ok(run_id)
    }

    pub fn run(&self, run_id: &str) -> Result<Arc<AgentRun>> {
        self.runs
            .read()
            .get(run_id)
            .cloned()
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))
    }

    /// 협력적 취소 요청. 이미 끝난 런이면 아무 일도 없다.
    pub fn cancel(&self, run_id: &str) -> Result<()> {
        self.run(run_id)?.cancel();
        Ok(())
    }

    pub fn status(&self, run_id: &str) -> Result<RunStatus> {
        Ok(self.run(run_id)?.status())
    }

    /// 런 종료까지 대기
    pub async fn wait(&self, run_id: &str) -> Result<RunOutcome> {
        let run = self.run(run_id)?;
        Ok(run.wait().await)
    }

    /// `cursor` 이후 이벤트 구독 (새 구독자는 0)
    pub fn subscribe(&self, run_id: &str, cursor: u64) -> Result<Subscription> {
        self.relay.subscribe(run_id, cursor)
    }

    /// 아직 끝나지 않은 런 수
    pub fn active_runs(&self) -> usize {
        self.runs
            .read()
            .values()
            .filter(|run| !run.status().is_terminal())
            .count()
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// 보관 시간이 지난 백로그 삭제, 백로그 없는 종료 런 정리
    pub fn purge_expired(&self) -> usize {
        let purged = self.relay.purge_expired();
        let relay = &self.relay;
        self.runs
            .write()
            .retain(|id, run| !run.status().is_terminal() || relay.contains(id));
        purged
    }

    /// 주기적으로 `purge_expired`를 호출하는 태스크
    pub fn spawn_janitor(self: &Arc<Self>) -> JoinHandle<()> {
        let runtime = Arc::clone(self);
        let period = self.config.relay.janitor_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = runtime.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = runtime.purge_expired();
                        if purged > 0 {
                            debug!("Janitor purged {} runs", purged);
                        }
                    }
                }
            }
            debug!("Janitor stopped");
        })
    }

    /// 새 런 거부, 활성 런 전부 취소, janitor 중지
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        for run in self.runs.read().values() {
            run.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Delivery;
    use async_trait::async_trait;
    use skein_provider::{ChunkStream, ScriptedProvider};

    /// 스트림을 열자마자 패닉하는 모델
    struct PanickingProvider;

    #[async_trait]
    impl Provider for PanickingProvider {
        fn name(&self) -> &str {
            "panicking"
        }

        fn model(&self) -> &str {
            "none"
        }

        fn stream(&self, _messages: Vec<Message>, _system_prompt: Option<String>) -> ChunkStream<'_> {
            panic!("model client exploded")
        }
    }

    fn runtime(provider: ScriptedProvider) -> AgentRuntime {
        AgentRuntime::new(
            SkeinConfig::default(),
            ToolRegistry::with_builtins().unwrap(),
            Arc::new(provider),
        )
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let rt = runtime(ScriptedProvider::new());
        assert!(matches!(rt.status("nope"), Err(Error::RunNotFound(_))));
        assert!(matches!(rt.subscribe("nope", 0), Err(Error::RunNotFound(_))));
        assert!(matches!(
            rt.start_run("nope", RunOptions::default()),
            Err(Error::ThreadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_run_releases_thread() {
        let rt = runtime(ScriptedProvider::new().repeat_text(["hi there"]));
        let thread_id = rt.create_thread();
        rt.append_user_message(&thread_id, "hello").unwrap();

        let run_id = rt.start_run(&thread_id, RunOptions::default()).unwrap();
        let outcome = rt.wait(&run_id).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(rt.active_runs(), 0);

        // done 이후에는 바로 다음 메시지와 런이 가능하다
        rt.append_user_message(&thread_id, "again").unwrap();
        let second = rt.start_run(&thread_id, RunOptions::default()).unwrap();
        assert_eq!(rt.wait(&second).await.unwrap().status, RunStatus::Completed);
        assert_eq!(rt.thread_messages(&thread_id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_runs() {
        let rt = runtime(ScriptedProvider::new());
        let thread_id = rt.create_thread();
        rt.shutdown();
        assert!(rt.start_run(&thread_id, RunOptions::default()).is_err());
    }

    #[tokio::test]
    async fn test_purge_forgets_finished_runs() {
        let mut config = SkeinConfig::default();
        config.relay.retention_secs = 0;
        let rt = AgentRuntime::new(
            config,
            ToolRegistry::with_builtins().unwrap(),
            Arc::new(ScriptedProvider::new().repeat_text(["ok"])),
        );
        let thread_id = rt.create_thread();
        let run_id = rt.start_run(&thread_id, RunOptions::default()).unwrap();
        rt.wait(&run_id).await.unwrap();

        assert_eq!(rt.purge_expired(), 1);
        assert!(matches!(rt.status(&run_id), Err(Error::RunNotFound(_))));
        assert!(matches!(rt.subscribe(&run_id, 0), Err(Error::RunNotFound(_))));
    }

    #[tokio::test]
    async fn test_panicking_turn_loop_still_finishes_run() {
        let rt = AgentRuntime::new(
            SkeinConfig::default(),
            ToolRegistry::with_builtins().unwrap(),
            Arc::new(PanickingProvider),
        );
        let thread_id = rt.create_thread();
        rt.append_user_message(&thread_id, "hi").unwrap();
        let run_id = rt.start_run(&thread_id, RunOptions::default()).unwrap();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), rt.wait(&run_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.reason.unwrap().starts_with("run task aborted"));

        let mut sub = rt.subscribe(&run_id, 0).unwrap();
        let mut kinds = Vec::new();
        while let Some(delivery) = sub.recv().await {
            if let Delivery::Event(event) = delivery {
                kinds.push((event.kind, event.payload["kind"].clone()));
            }
        }
        assert_eq!(kinds.len(), 2);
        assert_eq!(kinds[0], (EventKind::Error, serde_json::json!("internal_error")));
        assert_eq!(kinds[1].0, EventKind::Done);

        // 스레드 가드도 풀려 있다
        rt.append_user_message(&thread_id, "again").unwrap();
    }
}
