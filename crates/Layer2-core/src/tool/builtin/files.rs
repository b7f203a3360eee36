//! Files Tool - 디렉토리 목록 / 파일 읽기
//!
//! 상대 경로는 런의 작업 디렉토리 기준으로 해석합니다.

use async_trait::async_trait;
use skein_foundation::{Error, MarkupSchema, Result, Tool, ToolContext, ToolMethod, ToolOutput};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// list_files 입력
#[derive(Debug, Deserialize)]
struct ListInput {
    /// 대상 디렉토리 (기본: 작업 디렉토리)
    #[serde(default)]
    path: Option<String>,
}

/// read_file 입력
#[derive(Debug, Deserialize)]
struct ReadInput {
    path: String,
    /// 최대 바이트 수
    #[serde(default)]
    max_bytes: Option<usize>,
}

/// 파일 도구
pub struct FilesTool;

impl FilesTool {
    pub fn new() -> Self {
        Self
    }

    pub const NAME: &'static str = "files";

    /// 기본 읽기 제한 (256KB)
    const DEFAULT_MAX_BYTES: usize = 256 * 1024;

    fn resolve(ctx: &dyn ToolContext, path: Option<&str>) -> PathBuf {
        match path {
            Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
            Some(p) => ctx.working_dir().join(p),
            None => ctx.working_dir().to_path_buf(),
        }
    }

    async fn list_files(&self, input: ListInput, ctx: &dyn ToolContext) -> Result<ToolOutput> {
        let dir = Self::resolve(ctx, input.path.as_deref());

        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(r) => r,
            Err(e) => {
                return Ok(ToolOutput::error(format!(
                    "Cannot list {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let meta = entry.metadata().await?;
            let kind = if meta.is_dir() {
                "dir"
            } else if meta.is_symlink() {
                "symlink"
            } else {
                "file"
            };
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "kind": kind,
                "size": if meta.is_dir() { 0 } else { meta.len() },
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(ToolOutput::success(json!({
            "path": dir.display().to_string(),
            "entries": entries,
        })))
    }

    async fn read_file(&self, input: ReadInput, ctx: &dyn ToolContext) -> Result<ToolOutput> {
        let path = Self::resolve(ctx, Some(&input.path));
        let limit = input.max_bytes.unwrap_or(Self::DEFAULT_MAX_BYTES);

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => {
                return Ok(ToolOutput::error(format!(
                    "Cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let truncated = bytes.len() > limit;
        let content = String::from_utf8_lossy(&bytes[..bytes.len().min(limit)]).into_owned();

        Ok(ToolOutput::success(json!({
            "path": path.display().to_string(),
            "content": content,
            "truncated": truncated,
        })))
    }
}

impl Default for FilesTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FilesTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn methods(&self) -> Vec<ToolMethod> {
        vec![
            ToolMethod::new("list_files")
                .description("List the entries of a directory.")
                .schema(json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Directory to list. Defaults to the working directory."
                        }
                    }
                }))
                .markup(MarkupSchema::new("list_files").param("path", false)),
            ToolMethod::new("read_file")
                .description("Read a text file.")
                .schema(json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "File to read" },
                        "max_bytes": { "type": "integer", "description": "Read at most this many bytes" }
                    },
                    "required": ["path"]
                })),
        ]
    }

    async fn call(&self, method: &str, args: Value, ctx: &dyn ToolContext) -> Result<ToolOutput> {
        match method {
            "list_files" => {
                let input: ListInput = serde_json::from_value(args)
                    .map_err(|e| Error::InvalidInput(format!("Invalid input: {}", e)))?;
                self.list_files(input, ctx).await
            }
            "read_file" => {
                let input: ReadInput = serde_json::from_value(args)
                    .map_err(|e| Error::InvalidInput(format!("Invalid input: {}", e)))?;
                self.read_file(input, ctx).await
            }
            other => Err(Error::UnknownTool(other.to_string())),
        }
    }
}
