//! Tool Context - 도구 실행 컨텍스트
//!
//! Layer1 `ToolContext` trait 구현. 런마다 하나씩 만들어 모든 호출이 공유한다.

use skein_foundation::ToolContext;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 런타임 컨텍스트
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    run_id: String,
    thread_id: String,
    working_dir: PathBuf,
    env: HashMap<String, String>,
}

impl RuntimeContext {
    pub fn new(
        run_id: impl Into<String>,
        thread_id: impl Into<String>,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            thread_id: thread_id.into(),
            working_dir,
            env: HashMap::new(),
        }
    }

    /// 환경 변수 추가
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl ToolContext for RuntimeContext {
    fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn thread_id(&self) -> &str {
        &self.thread_id
    }

    fn env(&self) -> &HashMap<String, String> {
        &self.env
    }
}
