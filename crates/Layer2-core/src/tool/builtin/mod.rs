//! Builtin Tools - 내장 도구들
//!
//! ## 도구 목록
//!
//! ### 파일시스템 (`files`)
//! - `list_files` - 디렉토리 목록
//! - `read_file` - 파일 읽기
//!
//! ### 제어 (`control`)
//! - `complete` - 런 종료 (terminal)

pub mod control;
pub mod files;

pub use control::ControlTool;
pub use files::FilesTool;

use skein_foundation::Tool;
use std::sync::Arc;

/// 모든 builtin 도구 인스턴스 생성
pub fn all_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(FilesTool::new()) as Arc<dyn Tool>,
        Arc::new(ControlTool::new()),
    ]
}
