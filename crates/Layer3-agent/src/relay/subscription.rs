//! Subscription - 구독자 하나의 전달 커서
//!
//! 구독 시점의 백로그 사본을 먼저 재생하고, 그 뒤로는 구독자 전용
//! 큐에서 실시간 이벤트를 꺼낸다. 사본 작성과 큐 등록은 같은 락 안에서
//! 일어나므로 경계에서 이벤트가 빠지거나 중복되지 않는다.

use super::event::StreamEvent;
use super::RunChannel;
use futures::Stream;
use parking_lot::Mutex;
use skein_foundation::{Error, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// 구독자가 받는 것
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Event(StreamEvent),
    /// `missed_after` 이후 이벤트가 이 구독자에게서 유실됨.
    /// 이 구독은 끝났으므로 `resubscribe()`로 다시 맞춘다.
    Gap { missed_after: u64 },
}

// ============================================================================
// SubscriberSlot - 생산자 쪽에서 보는 구독자 큐
// ============================================================================

pub(crate) enum SlotPoll {
    Event(StreamEvent),
    Overflowed,
    Closed,
    Empty,
}

struct SlotState {
    queue: VecDeque<StreamEvent>,
    overflowed: bool,
    closed: bool,
}

pub(crate) struct SubscriberSlot {
    capacity: usize,
    state: Mutex<SlotState>,
    notify: Notify,
}

impl SubscriberSlot {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(SlotState {
                queue: VecDeque::new(),
                overflowed: false,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// 이벤트 전달. 큐가 넘치면 쌓인 항목을 버리고 gap을 표시한 뒤 `false`.
    /// 생산자는 절대 기다리지 않는다.
    pub(crate) fn offer(&self, event: &StreamEvent) -> std::result::Result<(), usize> {
        let mut state = self.state.lock();
        if state.overflowed || state.closed {
            return Ok(());
        }
        if state.queue.len() >= self.capacity {
            let dropped = state.queue.len();
            state.queue.clear();
            state.overflowed = true;
            drop(state);
            self.notify.notify_one();
            return Err(dropped);
        }
        state.queue.push_back(event.clone());
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    fn poll(&self) -> SlotPoll {
        let mut state = self.state.lock();
        if state.overflowed {
            return SlotPoll::Overflowed;
        }
        match state.queue.pop_front() {
            Some(event) => SlotPoll::Event(event),
            None if state.closed => SlotPoll::Closed,
            None => SlotPoll::Empty,
        }
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }
}

// ============================================================================
// Subscription - 소비자 쪽
// ============================================================================

pub struct Subscription {
    run_id: String,
    channel: Arc<RunChannel>,
    slot: Arc<SubscriberSlot>,
    replay: VecDeque<StreamEvent>,
    pending_gap: Option<u64>,
    cursor: u64,
    finished: bool,
}

impl Subscription {
    pub(crate) fn new(
        channel: Arc<RunChannel>,
        slot: Arc<SubscriberSlot>,
        replay: VecDeque<StreamEvent>,
        pending_gap: Option<u64>,
        cursor: u64,
    ) -> Self {
        Self {
            run_id: channel.run_id().to_string(),
            channel,
            slot,
            replay,
            pending_gap,
            cursor,
            finished: false,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// 마지막으로 전달된 seq
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// `done`까지 받았거나 gap/정리로 끝났는지
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 다음 전달. `done` 이후, gap 이후, 백로그 정리 후에는 `None`.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            if let Some(missed_after) = self.pending_gap.take() {
                return Some(Delivery::Gap { missed_after });
            }
            if self.finished {
                return None;
            }
            if let Some(event) = self.replay.pop_front() {
                if let Some(delivery) = self.accept(event) {
                    return Some(delivery);
                }
                continue;
            }

            match self.slot.poll() {
                SlotPoll::Event(event) => {
                    if let Some(delivery) = self.accept(event) {
                        return Some(delivery);
                    }
                }
                SlotPoll::Overflowed => {
                    self.finished = true;
                    return Some(Delivery::Gap {
                        missed_after: self.cursor,
                    });
                }
                SlotPoll::Closed => {
                    self.finished = true;
                    return None;
                }
                SlotPoll::Empty => self.slot.notify.notified().await,
            }
        }
    }

    /// `recv`와 같지만 gap을 `Error::StreamOverflow`로 돌려준다
    pub async fn recv_event(&mut self) -> Result<Option<StreamEvent>> {
        match self.recv().await {
            Some(Delivery::Event(event)) => Ok(Some(event)),
            Some(Delivery::Gap { missed_after }) => Err(Error::StreamOverflow {
                run_id: self.run_id.clone(),
                missed_after,
            }),
            None => Ok(None),
        }
    }

    /// 현재 커서에서 다시 구독
    pub fn resubscribe(&self) -> Result<Subscription> {
        self.channel.subscribe(self.cursor)
    }

    /// `Stream`으로 변환
    pub fn into_stream(self) -> impl Stream<Item = Delivery> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|delivery| (delivery, sub))
        })
    }

    #[cfg(test)]
    pub(crate) fn slot_queued(&self) -> usize {
        self.slot.queued()
    }

    fn accept(&mut self, event: StreamEvent) -> Option<Delivery> {
        if event.seq <= self.cursor {
            return None;
        }
        self.cursor = event.seq;
        if event.is_done() {
            self.finished = true;
        }
        Some(Delivery::Event(event))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.channel.detach(&self.slot);
    }
}
