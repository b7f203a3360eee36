//! 대표 시나리오 (A-E) 를 런타임 전체로 돌려 본다

mod common;

use common::*;
use serde_json::json;
use skein_agent::{Delivery, EventKind, RunOptions, RunStatus};
use skein_foundation::{ExecutionStrategy, MessageRole, SkeinConfig, ToolErrorKind, ToolResult};
use skein_provider::ScriptedProvider;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

// ============================================================================
// A: 도구 호출 없는 응답
// ============================================================================

#[tokio::test]
async fn scenario_a_plain_reply_completes() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new().turn_text(["Hello", "! How can I help?"]));
    let rt = runtime(&provider, dir.path());

    let (thread_id, run_id) = start(&rt, "hello", RunOptions::default());
    let events = drain(rt.subscribe(&run_id, 0).unwrap()).await;
    let outcome = wait(&rt, &run_id).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.turns, 1);
    assert_contiguous(&events);

    let messages = of_kind(&events, EventKind::AssistantMessage);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].payload["content"], json!("Hello! How can I help?"));
    assert!(of_kind(&events, EventKind::ToolResult).is_empty());
    assert_eq!(events.last().unwrap().payload["status"], json!("completed"));

    let thread = rt.thread_messages(&thread_id).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[1].role, MessageRole::Assistant);
    assert_eq!(thread[1].content, "Hello! How can I help?");
}

// ============================================================================
// B: 목록 도구 한 번 후 최종 응답
// ============================================================================

#[tokio::test]
async fn scenario_b_listing_then_final_message() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("notes.md"), "# notes").unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    let workspace = dir.path().display().to_string();

    let provider = Arc::new(
        ScriptedProvider::new()
            .turn_chunked(
                &format!(
                    "Let me look.\n{}",
                    structured(&[("list_files", json!({ "path": workspace }))])
                ),
                7,
            )
            .turn_text(["The workspace has notes.md and src."]),
    );
    let rt = runtime(&provider, dir.path());

    let (thread_id, run_id) = start(&rt, "what is in /workspace?", RunOptions::default());
    let events = drain(rt.subscribe(&run_id, 0).unwrap()).await;
    let outcome = wait(&rt, &run_id).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.turns, 2);
    assert_contiguous(&events);

    let results = of_kind(&events, EventKind::ToolResult);
    assert_eq!(results.len(), 1);
    let result: ToolResult = serde_json::from_value(results[0].payload.clone()).unwrap();
    assert!(result.success);
    assert_eq!(result.call_id, "call_1_1");
    let names: Vec<&str> = result.output["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["notes.md", "src"]);

    // 블록 텍스트는 delta로 나가지 않는다
    let streamed: String = of_kind(&events, EventKind::AssistantDelta)
        .iter()
        .filter_map(|e| e.payload["text"].as_str())
        .collect();
    assert!(streamed.starts_with("Let me look."));
    assert!(!streamed.contains("tool_calls"));
    assert_eq!(of_kind(&events, EventKind::AssistantMessage).len(), 1);

    let thread = rt.thread_messages(&thread_id).await.unwrap();
    let roles: Vec<MessageRole> = thread.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::Tool,
            MessageRole::Assistant
        ]
    );
    assert_eq!(thread[1].tool_calls.as_ref().unwrap()[0].name, "list_files");
    assert_eq!(thread[2].tool_results.as_ref().unwrap()[0].call_id, "call_1_1");

    // 두 번째 턴의 모델 컨텍스트에는 도구 결과가 들어 있다
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 3);
    assert!(requests[0]
        .system_prompt
        .as_deref()
        .unwrap()
        .contains("### list_files"));
}

// ============================================================================
// C: 닫히지 않은 markup 블록
// ============================================================================

#[tokio::test]
async fn scenario_c_unterminated_markup_fails_run() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new().turn_text([
        "Checking.\n<function_calls><invoke name=\"list_files\">",
        "<parameter name=\"path\">/workspace</parameter></invoke>",
    ]));
    let rt = runtime(&provider, dir.path());

    let (thread_id, run_id) = start(&rt, "list", RunOptions::default());
    let events = drain(rt.subscribe(&run_id, 0).unwrap()).await;
    let outcome = wait(&rt, &run_id).await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.reason.unwrap().starts_with("Parse error"));
    assert_contiguous(&events);
    assert!(of_kind(&events, EventKind::ToolResult).is_empty());

    let errors = of_kind(&events, EventKind::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].payload["kind"], json!("parse_error"));
    assert_eq!(events.last().unwrap().payload["status"], json!("failed"));

    // 실패한 턴은 기록되지 않고 이전 기록은 그대로
    let thread = rt.thread_messages(&thread_id).await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].content, "list");
}

// ============================================================================
// D: 병렬 전략에서 정상 호출 + 미등록 도구
// ============================================================================

#[tokio::test]
async fn scenario_d_unknown_tool_is_contained() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();

    let provider = Arc::new(
        ScriptedProvider::new()
            .turn_text([structured(&[
                ("list_files", json!({})),
                ("launch_rocket", json!({ "target": "moon" })),
            ])])
            .turn_text(["One of those tools does not exist."]),
    );
    let rt = runtime(&provider, dir.path());

    let options = RunOptions::new().with_strategy(ExecutionStrategy::Parallel);
    let (thread_id, run_id) = start(&rt, "go", options);
    let events = drain(rt.subscribe(&run_id, 0).unwrap()).await;
    let outcome = wait(&rt, &run_id).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.turns, 2);

    let results: Vec<ToolResult> = of_kind(&events, EventKind::ToolResult)
        .iter()
        .map(|e| serde_json::from_value(e.payload.clone()).unwrap())
        .collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].call_id, "call_1_1");
    assert!(results[0].success);
    assert_eq!(results[1].call_id, "call_1_2");
    assert!(!results[1].success);
    assert_eq!(results[1].error_kind(), Some(ToolErrorKind::UnknownTool));
    assert!(of_kind(&events, EventKind::Error).is_empty());

    let thread = rt.thread_messages(&thread_id).await.unwrap();
    assert_eq!(thread[2].tool_results.as_ref().unwrap().len(), 2);
}

// ============================================================================
// E: 느린 구독자 큐 넘침 후 재구독
// ============================================================================

#[tokio::test]
async fn scenario_e_overflow_gap_then_resubscribe() {
    let dir = tempdir().unwrap();
    let mut config = SkeinConfig::default();
    config.relay.subscriber_queue = 2;

    let text = "streaming many small fragments to overrun a tiny subscriber queue";
    let provider = Arc::new(
        ScriptedProvider::new()
            .turn_chunked(text, 3)
            .with_chunk_delay(Duration::from_millis(2)),
    );
    let rt = runtime_with(&provider, config, builtins(), dir.path());

    let (_, run_id) = start(&rt, "talk", RunOptions::default());
    let mut sub = rt.subscribe(&run_id, 0).unwrap();

    let first = match sub.recv().await {
        Some(Delivery::Event(event)) => event,
        other => panic!("expected first event, got {:?}", other),
    };
    assert_eq!(first.seq, 1);

    // 읽지 않는 동안 런이 끝까지 진행된다
    wait(&rt, &run_id).await;

    let missed_after = match sub.recv().await {
        Some(Delivery::Gap { missed_after }) => missed_after,
        other => panic!("expected gap, got {:?}", other),
    };
    assert_eq!(missed_after, 1);
    assert!(sub.recv().await.is_none());

    let tail = drain(sub.resubscribe().unwrap()).await;
    let mut seen = vec![first];
    seen.extend(tail);
    assert_contiguous(&seen);
    assert_eq!(seen.len(), rt.relay().backlog(&run_id).unwrap().len());
}
