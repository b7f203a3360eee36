//! Tool Registry - 도구 등록 및 조회
//!
//! 런이 사용하는 모든 호출 가능한 도구를 이름으로 색인합니다.
//!
//! ## 기능
//! - 도구 인스턴스의 메서드 테이블 등록 (중복 이름은 `DuplicateTool`)
//! - 게이트웨이 도구 등록 (`mcp_{provider}_{tool}`)
//! - 이름 → 핸들러 해석
//! - 런별 허용 목록으로 축소 (`enabled_set`)
//!
//! 레지스트리는 런 시작 전에 한 번 만들어지고 런 동안은 읽기 전용이다.
//! `Arc<ToolRegistry>`로 여러 런이 잠금 없이 공유한다.
//!
//! ```ignore
//! let mut registry = ToolRegistry::with_builtins()?;
//! gateway.register_into(&mut registry).await?;
//!
//! let enabled = registry.enabled_set(&ToolSelection::allow(["list_files", "mcp_github_*"]));
//! let spec = enabled.resolve("list_files")?;
//! ```

use super::builtin;
use super::schema::{ToolSource, ToolSpecification};
use skein_foundation::{Error, Result, Tool, ToolSelection};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// 도구 레지스트리
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    specs: HashMap<String, Arc<ToolSpecification>>,
    /// 등록 순서 (카탈로그 출력용)
    order: Vec<String>,
}

impl ToolRegistry {
    /// 빈 레지스트리 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// Builtin 도구들을 포함한 레지스트리 생성
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register_all(builtin::all_tools())?;
        Ok(registry)
    }

    /// 도구 인스턴스 등록 - 메서드마다 한 행
    ///
    /// 하나라도 중복이면 아무것도 등록하지 않는다.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<usize> {
        let methods = tool.methods();
        let mut specs = Vec::with_capacity(methods.len());
        for method in methods {
            if self.specs.contains_key(&method.name)
                || specs.iter().any(|s: &ToolSpecification| s.name == method.name)
            {
                return Err(Error::DuplicateTool(method.name));
            }
            specs.push(ToolSpecification::from_method(Arc::clone(&tool), method)?);
        }

        let count = specs.len();
        for spec in specs {
            self.insert(spec);
        }
        debug!("Registered tool '{}' with {} methods", tool.name(), count);
        Ok(count)
    }

    /// 여러 도구 한번에 등록
    pub fn register_all(&mut self, tools: Vec<Arc<dyn Tool>>) -> Result<usize> {
        let mut total = 0;
        for tool in tools {
            total += self.register(tool)?;
        }
        Ok(total)
    }

    /// 이미 만들어진 명세 등록 (게이트웨이 도구)
    pub fn register_spec(&mut self, spec: ToolSpecification) -> Result<()> {
        if self.specs.contains_key(&spec.name) {
            return Err(Error::DuplicateTool(spec.name));
        }
        self.insert(spec);
        Ok(())
    }

    fn insert(&mut self, spec: ToolSpecification) {
        self.order.push(spec.name.clone());
        self.specs.insert(spec.name.clone(), Arc::new(spec));
    }

    /// 이름 → 명세 해석
    pub fn resolve(&self, name: &str) -> Result<Arc<ToolSpecification>> {
        self.specs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    /// 도구 조회
    pub fn get(&self, name: &str) -> Option<&Arc<ToolSpecification>> {
        self.specs.get(name)
    }

    /// 도구 존재 여부
    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// 모든 도구 이름 (등록 순)
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// 등록 순으로 명세 순회
    pub fn specs(&self) -> impl Iterator<Item = &Arc<ToolSpecification>> {
        self.order.iter().filter_map(|name| self.specs.get(name))
    }

    /// 도구 개수
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// 비어있는지 확인
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// 게이트웨이 도구 개수
    pub fn gateway_tool_count(&self) -> usize {
        self.specs
            .values()
            .filter(|s| matches!(s.source, ToolSource::Gateway { .. }))
            .count()
    }

    /// 런에서 사용할 부분집합
    ///
    /// 핸들러는 `Arc`로 공유되므로 복사 비용은 이름 테이블 정도다.
    pub fn enabled_set(&self, selection: &ToolSelection) -> ToolRegistry {
        if *selection == ToolSelection::All {
            return self.clone();
        }

        let mut enabled = ToolRegistry::new();
        for name in &self.order {
            if selection.permits(name) {
                if let Some(spec) = self.specs.get(name) {
                    enabled.order.push(name.clone());
                    enabled.specs.insert(name.clone(), Arc::clone(spec));
                }
            }
        }

        info!(
            "Enabled {} of {} tools for run",
            enabled.len(),
            self.len()
        );
        enabled
    }

    // ========================================================================
    // 모델 프리앰블용 카탈로그
    // ========================================================================

    /// JSON Schema 형식으로 모든 도구 정보 반환
    pub fn schemas(&self) -> Vec<Value> {
        self.specs()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "description": spec.description,
                    "input_schema": spec.structured.clone().unwrap_or_else(|| json!({"type": "object"})),
                    "terminal": spec.terminal,
                })
            })
            .collect()
    }

    /// 사람이 읽는 카탈로그 (시스템 프리앰블에 포함)
    pub fn render_catalogue(&self) -> String {
        let mut out = String::new();
        for spec in self.specs() {
            out.push_str(&format!("### {}\n", spec.name));
            if !spec.description.is_empty() {
                out.push_str(&spec.description);
                out.push('\n');
            }
            if spec.terminal {
                out.push_str("Calling this tool ends the run.\n");
            }
            if let Some(schema) = &spec.structured {
                out.push_str(&format!("arguments schema: {}\n", schema));
            }
            if let Some(markup) = &spec.markup {
                let params: Vec<String> = markup
                    .params
                    .iter()
                    .map(|p| {
                        if p.required {
                            p.name.clone()
                        } else {
                            format!("{}?", p.name)
                        }
                    })
                    .collect();
                out.push_str(&format!(
                    "markup: <invoke name=\"{}\"> params: {}\n",
                    markup.tag,
                    if params.is_empty() {
                        "(none)".to_string()
                    } else {
                        params.join(", ")
                    }
                ));
            }
            out.push('\n');
        }
        out
    }
}

// ============================================================================
// 테스트
// ============================================================================
