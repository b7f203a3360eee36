//! # Stream Relay
//!
//! 런 하나의 이벤트를 여러 구독자에게 팬아웃한다.
//!
//! ```text
//! ThreadManager ──emit──► RunChannel ──► backlog (bounded, append-only)
//!                             │
//!                             ├──► SubscriberSlot (bounded queue) ──► Subscription
//!                             └──► SubscriberSlot (bounded queue) ──► Subscription
//! ```
//!
//! - 생산자는 느린 구독자를 기다리지 않는다. 구독자 큐가 넘치면 그
//!   구독자에게만 gap이 표시되고, 구독자는 커서에서 다시 구독한다.
//! - `done` 이벤트 이후 채널은 봉인되고, 보관 시간이 지나면
//!   `purge_expired()`가 백로그를 지운다.

mod event;
mod subscription;

pub use event::{EventKind, StreamEvent};
pub use subscription::{Delivery, Subscription};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use skein_foundation::{Error, RelaySettings, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use subscription::SubscriberSlot;
use tracing::{debug, info, warn};

// ============================================================================
// RunChannel - 런 하나의 백로그와 구독자 목록
// ============================================================================

struct ChannelState {
    backlog: VecDeque<StreamEvent>,
    next_seq: u64,
    sealed_at: Option<Instant>,
    purged: bool,
    subscribers: Vec<Arc<SubscriberSlot>>,
}

pub(crate) struct RunChannel {
    run_id: String,
    backlog_capacity: usize,
    queue_capacity: usize,
    state: Mutex<ChannelState>,
}

impl RunChannel {
    fn new(run_id: impl Into<String>, settings: &RelaySettings) -> Self {
        Self {
            run_id: run_id.into(),
            backlog_capacity: settings.backlog_capacity.max(1),
            queue_capacity: settings.subscriber_queue.max(1),
            state: Mutex::new(ChannelState {
                backlog: VecDeque::new(),
                next_seq: 1,
                sealed_at: None,
                purged: false,
                subscribers: Vec::new(),
            }),
        }
    }

    pub(crate) fn run_id(&self) -> &str {
        &self.run_id
    }

    fn emit(&self, kind: EventKind, payload: Value) -> Result<StreamEvent> {
        let mut state = self.state.lock();
        if state.sealed_at.is_some() {
            return Err(Error::Internal(format!(
                "run {} already emitted its final event",
                self.run_id
            )));
        }

        let event = StreamEvent::new(self.run_id.clone(), state.next_seq, kind, payload);
        state.next_seq += 1;

        state.backlog.push_back(event.clone());
        if state.backlog.len() > self.backlog_capacity {
            state.backlog.pop_front();
        }

        let run_id = &self.run_id;
        state.subscribers.retain(|slot| match slot.offer(&event) {
            Ok(()) => true,
            Err(dropped) => {
                warn!(
                    "Subscriber on run {} overflowed at seq {}; dropped {} queued events",
                    run_id, event.seq, dropped
                );
                false
            }
        });

        if event.is_done() {
            state.sealed_at = Some(Instant::now());
            // 구독자는 큐에 남은 done까지 읽고 스스로 끝난다
            state.subscribers.clear();
        }
        Ok(event)
    }

    /// `cursor` 이후부터 받는 구독 생성
    pub(crate) fn subscribe(self: &Arc<Self>, cursor: u64) -> Result<Subscription> {
        let mut state = self.state.lock();
        if state.purged {
            return Err(Error::RunNotFound(self.run_id.clone()));
        }

        let head = state
            .backlog
            .front()
            .map(|e| e.seq)
            .unwrap_or(state.next_seq);

        // 커서 이후 일부가 이미 백로그에서 밀려남: 백로그 머리부터 재동기화
        let (cursor, pending_gap) = if cursor + 1 < head {
            (head - 1, Some(cursor))
        } else {
            (cursor, None)
        };

        let replay: VecDeque<StreamEvent> = state
            .backlog
            .iter()
            .filter(|e| e.seq > cursor)
            .cloned()
            .collect();

        let slot = Arc::new(SubscriberSlot::new(self.queue_capacity));
        if state.sealed_at.is_some() {
            slot.close();
        } else {
            state.subscribers.push(Arc::clone(&slot));
        }

        debug!(
            "Subscribed to run {} at cursor {} ({} replayed)",
            self.run_id,
            cursor,
            replay.len()
        );
        Ok(Subscription::new(
            Arc::clone(self),
            slot,
            replay,
            pending_gap,
            cursor,
        ))
    }

    pub(crate) fn detach(&self, slot: &Arc<SubscriberSlot>) {
        self.state
            .lock()
            .subscribers
            .retain(|s| !Arc::ptr_eq(s, slot));
    }

    fn purge(&self) {
        let mut state = self.state.lock();
        state.purged = true;
        state.backlog.clear();
        for slot in state.subscribers.drain(..) {
            slot.close();
        }
    }

    fn expired(&self, retention: std::time::Duration, now: Instant) -> bool {
        self.state
            .lock()
            .sealed_at
            .is_some_and(|sealed| now.duration_since(sealed) >= retention)
    }
}

// ============================================================================
// RunPublisher - 턴 루프가 쥐는 생산자 핸들
// ============================================================================

/// 런 하나의 유일한 생산자
pub struct RunPublisher {
    channel: Arc<RunChannel>,
}

impl RunPublisher {
    pub fn run_id(&self) -> &str {
        self.channel.run_id()
    }

    /// 이벤트 추가 후 부여된 seq 반환. `done` 이후에는 에러.
    pub fn emit(&self, kind: EventKind, payload: Value) -> Result<u64> {
        self.channel.emit(kind, payload).map(|e| e.seq)
    }

    pub fn is_sealed(&self) -> bool {
        self.channel.state.lock().sealed_at.is_some()
    }
}

// ============================================================================
// StreamRelay - 런 id로 채널 관리
// ============================================================================

pub struct StreamRelay {
    settings: RelaySettings,
    channels: RwLock<HashMap<String, Arc<RunChannel>>>,
}

impl StreamRelay {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// 런 채널 생성
    pub fn open(&self, run_id: &str) -> Result<RunPublisher> {
        let mut channels = self.channels.write();
        if channels.contains_key(run_id) {
            return Err(Error::InvalidInput(format!(
                "relay channel for run {} already exists",
                run_id
            )));
        }
        let channel = Arc::new(RunChannel::new(run_id, &self.settings));
        channels.insert(run_id.to_string(), Arc::clone(&channel));
        Ok(RunPublisher { channel })
    }

    /// `cursor` 이후 이벤트부터 구독 (새 구독자는 0)
    pub fn subscribe(&self, run_id: &str, cursor: u64) -> Result<Subscription> {
        let channel = self
            .channels
            .read()
            .get(run_id)
            .cloned()
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))?;
        channel.subscribe(cursor)
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.channels.read().contains_key(run_id)
    }

    /// 백로그 사본 (디버깅/테스트용)
    pub fn backlog(&self, run_id: &str) -> Result<Vec<StreamEvent>> {
        let channels = self.channels.read();
        let channel = channels
            .get(run_id)
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))?;
        let events = channel.state.lock().backlog.iter().cloned().collect();
        Ok(events)
    }

    /// 보관 시간이 지난 백로그 삭제. 삭제한 런 수 반환.
    pub fn purge_expired(&self) -> usize {
        let retention = self.settings.retention();
        let now = Instant::now();

        let expired: Vec<Arc<RunChannel>> = {
            let mut channels = self.channels.write();
            let ids: Vec<String> = channels
                .iter()
                .filter(|(_, ch)| ch.expired(retention, now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| channels.remove(id)).collect()
        };

        for channel in &expired {
            channel.purge();
        }
        if !expired.is_empty() {
            info!("Purged {} expired run backlogs", expired.len());
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}
