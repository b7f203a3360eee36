//! Stream events
//!
//! 런 하나의 이벤트는 1부터 시작하는 연속된 `seq`를 가진다.
//! 전송 형식은 두 가지: JSON 한 줄 (`to_line`) 과 SSE 프레임 (`to_sse_frame`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// 어시스턴트 텍스트 조각 (지연 없이)
    AssistantDelta,
    /// 도구 호출 없이 끝난 턴의 최종 메시지
    AssistantMessage,
    /// 호출 하나의 결과
    ToolResult,
    /// 런 치명 에러
    Error,
    /// 항상 마지막 이벤트 (종료 상태 + 이유)
    Done,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AssistantDelta => "assistant_delta",
            EventKind::AssistantMessage => "assistant_message",
            EventKind::ToolResult => "tool_result",
            EventKind::Error => "error",
            EventKind::Done => "done",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 릴레이가 보관/전달하는 이벤트 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub run_id: String,
    pub seq: u64,
    pub kind: EventKind,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl StreamEvent {
    pub fn new(run_id: impl Into<String>, seq: u64, kind: EventKind, payload: Value) -> Self {
        Self {
            run_id: run_id.into(),
            seq,
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.kind == EventKind::Done
    }

    /// JSON 한 줄 (개행 포함)
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "run_id": self.run_id,
                "seq": self.seq,
                "kind": "error",
                "payload": { "message": format!("unserializable event: {}", e) },
            })
            .to_string()
        });
        line.push('\n');
        line
    }

    /// SSE 프레임 (빈 줄로 끝남)
    ///
    /// `id`는 seq라서 재연결 시 `Last-Event-ID`를 그대로 커서로 쓸 수 있다.
    pub fn to_sse_frame(&self) -> String {
        let data = self.payload.to_string();
        let mut frame = format!("id: {}\nevent: {}\n", self.seq, self.kind);
        for line in data.lines() {
            frame.push_str("data: ");
            frame.push_str(line);
            frame.push('\n');
        }
        frame.push('\n');
        frame
    }
}
