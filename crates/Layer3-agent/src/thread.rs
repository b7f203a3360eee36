//! Thread - append-only 대화 기록
//!
//! 스레드는 `tokio::sync::Mutex` 뒤에 있고, 런은 시작할 때 owned guard를
//! 잡아서 끝날 때까지 쥐고 있는다. 그래서 한 스레드를 동시에 변경하는
//! 런은 최대 하나다 (다른 쪽은 `ThreadBusy`).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use skein_foundation::{Error, Message, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// 대화 스레드
#[derive(Debug, Clone)]
pub struct Thread {
    id: String,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
}

impl Thread {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 메시지 추가 (수정/삭제 API는 없다)
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

/// 런이 쥐고 있는 스레드 쓰기 권한
pub type ThreadGuard = OwnedMutexGuard<Thread>;

/// 스레드 저장소 (메모리)
#[derive(Default)]
pub struct ThreadStore {
    threads: RwLock<HashMap<String, Arc<Mutex<Thread>>>>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 새 스레드 생성 후 id 반환
    pub fn create(&self) -> String {
        self.insert(Thread::new())
    }

    pub fn insert(&self, thread: Thread) -> String {
        let id = thread.id().to_string();
        self.threads
            .write()
            .insert(id.clone(), Arc::new(Mutex::new(thread)));
        id
    }

    fn entry(&self, thread_id: &str) -> Result<Arc<Mutex<Thread>>> {
        self.threads
            .read()
            .get(thread_id)
            .cloned()
            .ok_or_else(|| Error::ThreadNotFound(thread_id.to_string()))
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.threads.read().contains_key(thread_id)
    }

    /// 런이 없을 때만 메시지 추가
    pub fn append(&self, thread_id: &str, message: Message) -> Result<()> {
        let entry = self.entry(thread_id)?;
        let mut thread = entry
            .try_lock()
            .map_err(|_| Error::ThreadBusy(thread_id.to_string()))?;
        thread.append(message);
        Ok(())
    }

    /// 런 시작 시 쓰기 권한 획득 (기다리지 않는다)
    pub fn acquire(&self, thread_id: &str) -> Result<ThreadGuard> {
        self.entry(thread_id)?
            .try_lock_owned()
            .map_err(|_| Error::ThreadBusy(thread_id.to_string()))
    }

    /// 현재 메시지 사본 (진행 중인 런이 있으면 끝날 때까지 기다림)
    pub async fn snapshot(&self, thread_id: &str) -> Result<Vec<Message>> {
        let entry = self.entry(thread_id)?;
        let thread = entry.lock().await;
        Ok(thread.messages().to_vec())
    }

    pub fn len(&self) -> usize {
        self.threads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.read().is_empty()
    }
}
