//! 도구 선택과 실행 전략

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 런에서 사용할 도구 집합
///
/// ```json
/// "tools": "all"
/// "tools": { "allow": ["list_files", "mcp_github_*"] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSelection {
    /// 등록된 모든 도구 (기본값)
    #[default]
    All,
    /// 허용 목록 (glob 패턴 지원)
    Allow(Vec<String>),
}

impl ToolSelection {
    pub fn allow<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Allow(patterns.into_iter().map(Into::into).collect())
    }

    /// 도구 이름이 선택에 포함되는지
    pub fn permits(&self, name: &str) -> bool {
        match self {
            ToolSelection::All => true,
            ToolSelection::Allow(patterns) => patterns.iter().any(|p| {
                glob::Pattern::new(p)
                    .map(|pattern| pattern.matches(name))
                    .unwrap_or_else(|_| p == name)
            }),
        }
    }
}

/// 한 턴 안의 도구 실행 전략
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// 선언 순서대로 하나씩
    Sequential,
    /// 모두 동시에 디스패치
    #[default]
    Parallel,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::Sequential => write!(f, "sequential"),
            ExecutionStrategy::Parallel => write!(f, "parallel"),
        }
    }
}

impl FromStr for ExecutionStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionStrategy::Sequential),
            "parallel" => Ok(ExecutionStrategy::Parallel),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown execution strategy '{}'",
                other
            ))),
        }
    }
}
