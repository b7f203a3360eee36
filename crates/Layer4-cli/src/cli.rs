//! Non-interactive CLI mode

use anyhow::{bail, Context};
use skein_agent::{AgentRuntime, Delivery, RunOptions, RunStatus, StreamEvent};
use skein_core::{ConfigLoader, ToolGateway, ToolRegistry};
use skein_foundation::{ExecutionStrategy, SkeinConfig, ToolSelection};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// `skein run` 인자
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub prompt: String,
    pub tools: Vec<String>,
    pub strategy: Option<ExecutionStrategy>,
    pub max_turns: Option<u32>,
    pub sse: bool,
}

impl RunArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            tools: (!self.tools.is_empty()).then(|| ToolSelection::allow(self.tools.iter())),
            strategy: self.strategy,
            max_turns: self.max_turns,
        }
    }
}

/// 기본 검색 경로 + 명시 파일
pub fn load_config(working_dir: &Path, explicit: Option<PathBuf>) -> anyhow::Result<SkeinConfig> {
    let mut loader = ConfigLoader::new(working_dir);
    if let Some(path) = explicit {
        loader = loader.with_explicit(path);
    }
    let config = loader.load_all().context("failed to load settings")?;
    Ok(config)
}

/// builtin 도구 + 게이트웨이 탐색
async fn build_registry(config: &SkeinConfig) -> anyhow::Result<(ToolRegistry, ToolGateway)> {
    let mut registry = ToolRegistry::with_builtins()?;
    let gateway = ToolGateway::new(config.gateway.clone());
    let report = gateway.register_into(&mut registry).await?;
    for (provider, reason) in &report.skipped {
        warn!("Skipped tool provider '{}': {}", provider, reason);
    }
    if !report.registered.is_empty() {
        info!("Registered {} gateway tools", report.registered.len());
    }
    Ok((registry, gateway))
}

/// 프롬프트 하나로 런을 돌리고 이벤트를 stdout에 쓴다
pub async fn run_once(config: SkeinConfig, working_dir: PathBuf, args: RunArgs) -> anyhow::Result<()> {
    let provider = skein_provider::from_settings(&config.model)?;
    let (registry, gateway) = build_registry(&config).await?;

    let runtime = Arc::new(AgentRuntime::new(config, registry, provider).with_working_dir(working_dir));
    let janitor = runtime.spawn_janitor();

    let thread_id = runtime.create_thread();
    runtime.append_user_message(&thread_id, args.prompt.as_str())?;
    let run_id = runtime.start_run(&thread_id, args.options())?;

    let streamed = stream_events(&runtime, &run_id, args.sse).await;
    let outcome = runtime.wait(&run_id).await?;

    runtime.shutdown();
    gateway.shutdown().await;
    janitor.abort();
    streamed?;

    info!(
        "Run {} {} after {} turns ({} in / {} out tokens)",
        run_id,
        outcome.status,
        outcome.turns,
        outcome.usage.input_tokens,
        outcome.usage.output_tokens
    );

    match outcome.status {
        RunStatus::Failed => bail!(
            "run failed: {}",
            outcome.reason.unwrap_or_else(|| "unknown reason".to_string())
        ),
        _ => Ok(()),
    }
}

/// `done`까지 출력. Ctrl-C는 런 취소로 바꾸고 계속 받는다.
async fn stream_events(runtime: &AgentRuntime, run_id: &str, sse: bool) -> anyhow::Result<()> {
    let mut sub = runtime.subscribe(run_id, 0)?;
    let mut cancel_sent = false;
    let stdout = std::io::stdout();

    loop {
        let delivery = tokio::select! {
            delivery = sub.recv() => delivery,
            _ = tokio::signal::ctrl_c(), if !cancel_sent => {
                warn!("Interrupted, cancelling run {}", run_id);
                runtime.cancel(run_id)?;
                cancel_sent = true;
                continue;
            }
        };

        match delivery {
            Some(Delivery::Event(event)) => {
                let mut out = stdout.lock();
                out.write_all(render(&event, sse).as_bytes())?;
                out.flush()?;
            }
            Some(Delivery::Gap { missed_after }) => {
                warn!("Fell behind after event {}, resubscribing", missed_after);
                sub = sub.resubscribe()?;
            }
            None => return Ok(()),
        }
    }
}

fn render(event: &StreamEvent, sse: bool) -> String {
    if sse {
        event.to_sse_frame()
    } else {
        event.to_line()
    }
}

/// `skein tools`
pub async fn list_tools(config: SkeinConfig) -> anyhow::Result<()> {
    let (registry, gateway) = build_registry(&config).await?;
    let registry = registry.enabled_set(&config.tools);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for spec in registry.specs() {
        let marker = if spec.terminal { " (terminal)" } else { "" };
        writeln!(out, "{:<32} {}{}", spec.name, spec.source, marker)?;
        if !spec.description.is_empty() {
            writeln!(out, "    {}", spec.description)?;
        }
    }
    out.flush()?;
    drop(out);

    gateway.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skein_agent::EventKind;

    #[test]
    fn test_tools_flag_becomes_allow_list() {
        let args = RunArgs {
            prompt: "x".into(),
            tools: vec!["list_*".into()],
            strategy: None,
            max_turns: Some(2),
            sse: false,
        };
        let options = args.options();
        assert_eq!(options.tools, Some(ToolSelection::allow(["list_*"])));
        assert_eq!(options.max_turns, Some(2));

        let none = RunArgs { tools: vec![], ..args };
        assert!(none.options().tools.is_none());
    }

    #[test]
    fn test_render_modes() {
        let event = StreamEvent::new("run", 1, EventKind::Done, json!({"status": "completed"}));
        assert!(render(&event, false).ends_with("}\n"));
        assert!(render(&event, true).starts_with("id: 1\nevent: done\n"));
    }
}
