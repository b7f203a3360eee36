//! 런 단위 성질: 턴 제한, 취소, 늦은 구독자, 스레드 단일 쓰기, terminal 도구

mod common;

use common::*;
use serde_json::json;
use skein_agent::{Delivery, EventKind, RunOptions, RunStatus};
use skein_foundation::{Error, ExecutionStrategy, MessageRole, ToolErrorKind, ToolResult, ToolSelection};
use skein_provider::{ProviderError, ScriptedProvider};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn results_of(events: &[skein_agent::StreamEvent]) -> Vec<ToolResult> {
    of_kind(events, EventKind::ToolResult)
        .iter()
        .map(|e| serde_json::from_value(e.payload.clone()).unwrap())
        .collect()
}

// ============================================================================
// Turn limit
// ============================================================================

#[tokio::test]
async fn non_terminal_tool_loop_stops_at_turn_limit() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(
        ScriptedProvider::new().repeat_text([structured(&[("list_files", json!({}))])]),
    );
    let rt = runtime(&provider, dir.path());

    let (thread_id, run_id) = start(&rt, "loop forever", RunOptions::new().with_max_turns(3));
    let events = drain(rt.subscribe(&run_id, 0).unwrap()).await;
    let outcome = wait(&rt, &run_id).await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.turns, 3);
    assert_eq!(
        outcome.reason.as_deref(),
        Some("Turn limit exceeded after 3 turns")
    );
    assert_eq!(provider.call_count(), 3);

    assert_contiguous(&events);
    assert_eq!(results_of(&events).len(), 3);
    let errors = of_kind(&events, EventKind::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].payload["kind"], json!("turn_limit_exceeded"));

    // call_{turn}_{n}
    let ids: Vec<String> = results_of(&events).into_iter().map(|r| r.call_id).collect();
    assert_eq!(ids, vec!["call_1_1", "call_2_1", "call_3_1"]);

    let thread = rt.thread_messages(&thread_id).await.unwrap();
    assert_eq!(thread.len(), 1 + 3 * 2);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn cancel_lets_in_flight_tool_finish() {
    let dir = tempdir().unwrap();
    let slow = SlowTool::new(Duration::from_millis(150));
    let mut registry = builtins();
    registry.register(slow.clone()).unwrap();

    let call = structured(&[("slow_step", json!({}))]);
    let provider = Arc::new(ScriptedProvider::new().repeat_text([call]));
    let rt = runtime_with(&provider, Default::default(), registry, dir.path());

    let (thread_id, run_id) = start(&rt, "work slowly", RunOptions::default());
    let sub = rt.subscribe(&run_id, 0).unwrap();

    let run = rt.run(&run_id).unwrap();
    let mut status = run.watch_status();
    tokio::time::timeout(
        TIMEOUT,
        status.wait_for(|s| *s == RunStatus::ToolExecuting),
    )
    .await
    .unwrap()
    .unwrap();
    tokio::time::timeout(TIMEOUT, async {
        while slow.started() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    assert!(!slow.finished());

    rt.cancel(&run_id).unwrap();
    let outcome = wait(&rt, &run_id).await;

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.turns, 1);
    assert!(slow.finished());
    assert_eq!(slow.started(), 1);
    assert_eq!(provider.call_count(), 1);

    let events = drain(sub).await;
    assert_contiguous(&events);
    assert_eq!(results_of(&events).len(), 1);
    assert!(results_of(&events)[0].success);
    assert_eq!(events.last().unwrap().payload["status"], json!("cancelled"));

    // 실행된 호출과 결과는 짝을 이뤄 남는다
    let thread = rt.thread_messages(&thread_id).await.unwrap();
    let roles: Vec<MessageRole> = thread.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![MessageRole::User, MessageRole::Assistant, MessageRole::Tool]
    );
}

#[tokio::test]
async fn cancel_during_stream_discards_partial_turn() {
    let dir = tempdir().unwrap();
    let slow = SlowTool::new(Duration::from_millis(1));
    let mut registry = builtins();
    registry.register(slow.clone()).unwrap();

    let output = format!(
        "Thinking about it for a while. {}",
        structured(&[("slow_step", json!({}))])
    );
    let provider = Arc::new(
        ScriptedProvider::new()
            .turn_chunked(&output, 4)
            .with_chunk_delay(Duration::from_millis(20)),
    );
    let rt = runtime_with(&provider, Default::default(), registry, dir.path());

    let (thread_id, run_id) = start(&rt, "think", RunOptions::default());
    let mut sub = rt.subscribe(&run_id, 0).unwrap();

    match sub.recv().await {
        Some(Delivery::Event(event)) => assert_eq!(event.kind, EventKind::AssistantDelta),
        other => panic!("expected a delta, got {:?}", other),
    }
    rt.cancel(&run_id).unwrap();

    let outcome = wait(&rt, &run_id).await;
    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(slow.started(), 0);

    let events = drain(sub).await;
    assert!(of_kind(&events, EventKind::ToolResult).is_empty());
    assert_eq!(events.last().unwrap().kind, EventKind::Done);

    let thread = rt.thread_messages(&thread_id).await.unwrap();
    assert_eq!(thread.len(), 1);
}

#[tokio::test]
async fn cancel_unknown_run() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    let rt = runtime(&provider, dir.path());
    assert!(matches!(rt.cancel("missing"), Err(Error::RunNotFound(_))));
}

// ============================================================================
// Relay replay
// ============================================================================

#[tokio::test]
async fn late_subscriber_sees_backlog_then_live() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(
        ScriptedProvider::new()
            .turn_chunked("one two three four five six seven eight nine ten", 5)
            .with_chunk_delay(Duration::from_millis(5)),
    );
    let rt = runtime(&provider, dir.path());

    let (_, run_id) = start(&rt, "count", RunOptions::default());
    let mut early = rt.subscribe(&run_id, 0).unwrap();

    let mut early_events = Vec::new();
    while early_events.len() < 3 {
        match early.recv().await {
            Some(Delivery::Event(event)) => early_events.push(event),
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_ne!(rt.status(&run_id).unwrap(), RunStatus::Completed);

    let late = rt.subscribe(&run_id, 0).unwrap();
    let late_events = drain(late).await;
    early_events.extend(drain(early).await);

    assert_contiguous(&late_events);
    assert_eq!(late_events, early_events);
}

#[tokio::test]
async fn subscriber_after_completion_replays_everything() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new().turn_text(["a", "b", "c"]));
    let rt = runtime(&provider, dir.path());

    let (_, run_id) = start(&rt, "abc", RunOptions::default());
    wait(&rt, &run_id).await;

    let all = drain(rt.subscribe(&run_id, 0).unwrap()).await;
    assert_contiguous(&all);
    assert_eq!(
        kinds(&all),
        vec![
            EventKind::AssistantDelta,
            EventKind::AssistantDelta,
            EventKind::AssistantDelta,
            EventKind::AssistantMessage,
            EventKind::Done
        ]
    );

    // 커서 이후만
    let tail = drain(rt.subscribe(&run_id, 3).unwrap()).await;
    assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4, 5]);
}

// ============================================================================
// Single writer
// ============================================================================

#[tokio::test]
async fn thread_is_busy_while_run_is_active() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(
        ScriptedProvider::new()
            .repeat_text(["slow ", "reply"])
            .with_chunk_delay(Duration::from_millis(50)),
    );
    let rt = runtime(&provider, dir.path());

    let (thread_id, run_id) = start(&rt, "hi", RunOptions::default());

    assert!(matches!(
        rt.start_run(&thread_id, RunOptions::default()),
        Err(Error::ThreadBusy(_))
    ));
    assert!(matches!(
        rt.append_user_message(&thread_id, "interrupt"),
        Err(Error::ThreadBusy(_))
    ));

    // 다른 스레드는 영향 없음
    let other = rt.create_thread();
    rt.append_user_message(&other, "parallel").unwrap();
    let other_run = rt.start_run(&other, RunOptions::default()).unwrap();

    assert_eq!(wait(&rt, &run_id).await.status, RunStatus::Completed);
    assert_eq!(wait(&rt, &other_run).await.status, RunStatus::Completed);
    rt.append_user_message(&thread_id, "after").unwrap();
}

// ============================================================================
// Terminal tool
// ============================================================================

#[tokio::test]
async fn sequential_terminal_call_skips_the_rest() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new().turn_text([structured(&[
        ("complete", json!({ "summary": "nothing left to do" })),
        ("list_files", json!({})),
    ])]));
    let rt = runtime(&provider, dir.path());

    let options = RunOptions::new().with_strategy(ExecutionStrategy::Sequential);
    let (thread_id, run_id) = start(&rt, "wrap up", options);
    let events = drain(rt.subscribe(&run_id, 0).unwrap()).await;
    let outcome = wait(&rt, &run_id).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.reason.as_deref(), Some("terminal tool complete"));
    assert_eq!(provider.call_count(), 1);

    let results = results_of(&events);
    assert_eq!(results.len(), 2);
    assert!(results[0].success && results[0].terminal);
    assert_eq!(results[0].output["summary"], json!("nothing left to do"));
    assert_eq!(results[1].error_kind(), Some(ToolErrorKind::Skipped));

    let thread = rt.thread_messages(&thread_id).await.unwrap();
    assert_eq!(thread.last().unwrap().tool_results.as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn invalid_terminal_call_lets_the_model_retry() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(
        ScriptedProvider::new()
            .turn_text([structured(&[("complete", json!({}))])])
            .turn_text(["all done"]),
    );
    let rt = runtime(&provider, dir.path());

    let (thread_id, run_id) = start(&rt, "finish up", RunOptions::default());
    let events = drain(rt.subscribe(&run_id, 0).unwrap()).await;
    let outcome = wait(&rt, &run_id).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.turns, 2);
    assert_eq!(provider.call_count(), 2);
    assert!(of_kind(&events, EventKind::Error).is_empty());

    let results = results_of(&events);
    assert_eq!(results.len(), 1);
    assert!(!results[0].terminal);
    assert_eq!(results[0].error_kind(), Some(ToolErrorKind::Validation));

    let thread = rt.thread_messages(&thread_id).await.unwrap();
    assert_eq!(thread.last().unwrap().content, "all done");
}

// ============================================================================
// Dialects / selection / model errors
// ============================================================================

#[tokio::test]
async fn both_dialects_produce_the_same_result() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("greeting.txt"), "hello world").unwrap();

    let structured_call = structured(&[("read_file", json!({ "path": "greeting.txt", "max_bytes": 5 }))]);
    let markup_call = "<function_calls><invoke name=\"read_file\">\
                       <parameter name=\"path\">greeting.txt</parameter>\
                       <parameter name=\"max_bytes\">5</parameter>\
                       </invoke></function_calls>";

    let mut outputs = Vec::new();
    for call in [structured_call.as_str(), markup_call] {
        let provider = Arc::new(ScriptedProvider::new().turn_text([call]).turn_text(["ok"]));
        let rt = runtime(&provider, dir.path());
        let (thread_id, run_id) = start(&rt, "read it", RunOptions::default());
        let events = drain(rt.subscribe(&run_id, 0).unwrap()).await;
        assert_eq!(wait(&rt, &run_id).await.status, RunStatus::Completed);

        let thread = rt.thread_messages(&thread_id).await.unwrap();
        let request = thread[1].tool_calls.as_ref().unwrap()[0].clone();
        outputs.push((request.arguments, results_of(&events)[0].output.clone()));
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0].0["max_bytes"], json!(5));
    assert_eq!(outputs[0].1["content"], json!("hello"));
    assert_eq!(outputs[0].1["truncated"], json!(true));
}

#[tokio::test]
async fn restricted_tool_selection_hides_other_tools() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(
        ScriptedProvider::new()
            .turn_text([structured(&[("read_file", json!({ "path": "x" }))])])
            .turn_text(["fine"]),
    );
    let rt = runtime(&provider, dir.path());

    let options = RunOptions::new().with_tools(ToolSelection::allow(["list_*"]));
    let (_, run_id) = start(&rt, "read", options);
    let events = drain(rt.subscribe(&run_id, 0).unwrap()).await;
    wait(&rt, &run_id).await;

    let preamble = provider.requests()[0].system_prompt.clone().unwrap();
    assert!(preamble.contains("### list_files"));
    assert!(!preamble.contains("### read_file"));
    assert_eq!(
        results_of(&events)[0].error_kind(),
        Some(ToolErrorKind::UnknownTool)
    );
}

#[tokio::test]
async fn model_error_mid_stream_fails_run_verbatim() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new().turn_text_then_error(
        ["partial answer"],
        ProviderError::RateLimited {
            retry_after_ms: Some(2000),
        },
    ));
    let rt = runtime(&provider, dir.path());

    let (thread_id, run_id) = start(&rt, "hi", RunOptions::default());
    let events = drain(rt.subscribe(&run_id, 0).unwrap()).await;
    let outcome = wait(&rt, &run_id).await;

    assert_eq!(outcome.status, RunStatus::Failed);
    let reason = outcome.reason.unwrap();
    assert_eq!(reason, "Model error: Rate limit exceeded, retry after 2000ms");

    assert_eq!(
        kinds(&events),
        vec![EventKind::AssistantDelta, EventKind::Error, EventKind::Done]
    );
    assert_eq!(of_kind(&events, EventKind::Error)[0].payload["message"], json!(reason));
    assert_eq!(rt.thread_messages(&thread_id).await.unwrap().len(), 1);
}
