//! Streaming Call Parser
//!
//! 모델 청크를 받는 즉시 처리한다.
//! - 호출 블록 밖의 텍스트는 바로 `ParseEvent::Text`로 내보낸다 (지연 없음).
//!   단, 버퍼 끝이 여는 구분자의 앞부분일 수 있으면 그 부분만 잡아둔다.
//! - 블록이 닫히는 순간 블록을 파싱해서 호출마다 `ParseEvent::Call`을 내보낸다.
//! - 블록 안에서 출력이 끝나면 `finish()`가 `Unterminated`를 돌려준다.
//!
//! 에러가 나면 그 턴의 파서는 버려야 한다.

use super::{canonicalize, delimiters, dialect_name, parse_block, ParseError};
use crate::tool::ToolRegistry;
use skein_foundation::{CallDialect, ToolCallRequest};
use std::sync::Arc;
use tracing::debug;

const DIALECTS: [CallDialect; 2] = [CallDialect::Structured, CallDialect::Markup];

/// 파서 출력
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    /// 호출 블록 밖의 어시스턴트 텍스트
    Text(String),
    /// 완성된 호출
    Call(ToolCallRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    Block(CallDialect),
}

/// 턴 하나의 증분 파서
pub struct CallParser {
    turn: u32,
    seq: u32,
    state: State,
    buffer: String,
    registry: Option<Arc<ToolRegistry>>,
}

impl CallParser {
    pub fn new(turn: u32) -> Self {
        Self {
            turn,
            seq: 0,
            state: State::Text,
            buffer: String::new(),
            registry: None,
        }
    }

    /// markup 값 타입 변환에 쓸 레지스트리
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 지금까지 만든 호출 수
    pub fn call_count(&self) -> u32 {
        self.seq
    }

    /// 한 번에 파싱 (비스트리밍)
    pub fn parse_all(
        turn: u32,
        text: &str,
        registry: Option<Arc<ToolRegistry>>,
    ) -> Result<Vec<ParseEvent>, ParseError> {
        let mut parser = CallParser::new(turn);
        parser.registry = registry;
        let mut events = parser.feed(text)?;
        events.extend(parser.finish()?);
        Ok(events)
    }

    /// 청크 추가
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<ParseEvent>, ParseError> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        loop {
            match self.state {
                State::Text => match self.find_opener() {
                    Some((pos, dialect)) => {
                        self.emit_text(pos, &mut events);
                        let (open, _) = delimiters(dialect);
                        self.buffer.drain(..open.len());
                        self.state = State::Block(dialect);
                        debug!("Call block opened ({})", dialect_name(dialect));
                    }
                    None => {
                        let keep = self.partial_opener_len();
                        let emit = self.buffer.len() - keep;
                        self.emit_text(emit, &mut events);
                        break;
                    }
                },
                State::Block(dialect) => {
                    let (_, close) = delimiters(dialect);
                    let Some(end) = self.buffer.find(close) else {
                        break;
                    };
                    let body: String = self.buffer.drain(..end).collect();
                    self.buffer.drain(..close.len());
                    self.state = State::Text;

                    for raw in parse_block(dialect, &body)? {
                        self.seq += 1;
                        let call_id = format!("call_{}_{}", self.turn, self.seq);
                        let call = canonicalize(raw, call_id, self.registry.as_deref())?;
                        events.push(ParseEvent::Call(call));
                    }
                }
            }
        }

        Ok(events)
    }

    /// 출력 종료
    pub fn finish(&mut self) -> Result<Vec<ParseEvent>, ParseError> {
        if let State::Block(dialect) = self.state {
            return Err(ParseError::Unterminated {
                dialect: dialect_name(dialect),
            });
        }

        let mut events = Vec::new();
        let len = self.buffer.len();
        self.emit_text(len, &mut events);
        Ok(events)
    }

    fn emit_text(&mut self, upto: usize, events: &mut Vec<ParseEvent>) {
        if upto == 0 {
            return;
        }
        let text: String = self.buffer.drain(..upto).collect();
        events.push(ParseEvent::Text(text));
    }

    /// 가장 앞에 있는 여는 구분자
    fn find_opener(&self) -> Option<(usize, CallDialect)> {
        DIALECTS
            .iter()
            .filter_map(|d| {
                let (open, _) = delimiters(*d);
                self.buffer.find(open).map(|pos| (pos, *d))
            })
            .min_by_key(|(pos, _)| *pos)
    }

    /// 버퍼 끝에서 여는 구분자의 앞부분과 일치하는 가장 긴 길이
    fn partial_opener_len(&self) -> usize {
        let longest = DIALECTS
            .iter()
            .map(|d| delimiters(*d).0.len())
            .max()
            .unwrap_or(0);
        let max = longest.saturating_sub(1).min(self.buffer.len());

        (1..=max)
            .rev()
            .find(|&k| {
                let start = self.buffer.len() - k;
                self.buffer.is_char_boundary(start)
                    && DIALECTS
                        .iter()
                        .any(|d| delimiters(*d).0.starts_with(&self.buffer[start..]))
            })
            .unwrap_or(0)
    }
}
