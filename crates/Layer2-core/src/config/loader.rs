//! Configuration Loader
//!
//! skein 설정 로더 (`.skein` 폴더)
//!
//! ## 검색 우선순위 (낮은 → 높은)
//!
//! 1. User-level: `~/.skein/settings.json`
//! 2. Project-level: `.skein/settings.json`
//! 3. Local (gitignored): `.skein/settings.local.json`
//! 4. 명시적으로 지정한 파일 (`--config`)
//!
//! 각 파일은 JSON 값으로 읽어서 키 단위로 깊게 병합한 뒤 한 번만
//! `SkeinConfig`로 역직렬화한다. 그래서 상위 파일이 일부 키만 적어도
//! 나머지는 하위 파일 값(또는 기본값)이 유지된다.

use serde_json::{Map, Value};
use skein_foundation::{Error, Result, SkeinConfig, CONFIG_DIR_NAME};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 설정 파일 경로 정보
#[derive(Debug, Clone)]
struct ConfigPath {
    path: PathBuf,
    description: &'static str,
    /// 명시적으로 지정된 파일은 없거나 잘못되면 에러
    explicit: bool,
}

/// 설정 로더
pub struct ConfigLoader {
    search_paths: Vec<ConfigPath>,
}

impl ConfigLoader {
    /// 기본 검색 경로
    pub fn new(working_dir: &Path) -> Self {
        let mut paths = Vec::new();

        if let Some(home) = dirs::home_dir() {
            paths.push(ConfigPath {
                path: home.join(CONFIG_DIR_NAME).join("settings.json"),
                description: "User settings",
                explicit: false,
            });
        }

        paths.push(ConfigPath {
            path: working_dir.join(CONFIG_DIR_NAME).join("settings.json"),
            description: "Project settings",
            explicit: false,
        });

        paths.push(ConfigPath {
            path: working_dir.join(CONFIG_DIR_NAME).join("settings.local.json"),
            description: "Local settings",
            explicit: false,
        });

        Self {
            search_paths: paths,
        }
    }

    /// 기본 경로 없이 지정한 경로만
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        let search_paths = paths
            .into_iter()
            .map(|path| ConfigPath {
                path,
                description: "Custom settings",
                explicit: false,
            })
            .collect();
        Self { search_paths }
    }

    /// 가장 높은 우선순위로 명시 파일 추가
    pub fn with_explicit(mut self, path: PathBuf) -> Self {
        self.search_paths.push(ConfigPath {
            path,
            description: "Explicit settings",
            explicit: true,
        });
        self
    }

    /// 모든 경로에서 읽어 병합
    pub fn load_all(&self) -> Result<SkeinConfig> {
        let mut merged = Value::Object(Map::new());

        for config_path in &self.search_paths {
            if !config_path.path.exists() {
                if config_path.explicit {
                    return Err(Error::Config(format!(
                        "settings file not found: {}",
                        config_path.path.display()
                    )));
                }
                continue;
            }

            match read_layer(&config_path.path) {
                Ok(layer) => {
                    info!(
                        "Loaded {} from: {}",
                        config_path.description,
                        config_path.path.display()
                    );
                    merge_values(&mut merged, layer);
                }
                Err(e) if config_path.explicit => return Err(e),
                Err(e) => warn!(
                    "Failed to load settings from {}: {}",
                    config_path.path.display(),
                    e
                ),
            }
        }

        serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("invalid merged settings: {}", e)))
    }

    /// 존재하는 설정 파일 목록
    pub fn existing_files(&self) -> Vec<PathBuf> {
        self.search_paths
            .iter()
            .filter(|p| p.path.exists())
            .map(|p| p.path.clone())
            .collect()
    }
}

// ============================================================================
// 유틸리티 함수
// ============================================================================

/// 파일 하나를 설정 값으로 읽기 (`.toml` 확장자는 TOML, 그 외는 주석 허용 JSON)
pub fn read_layer(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    let value: Value = if is_toml {
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid TOML at {}: {}", path.display(), e)))?
    } else {
        serde_json::from_str(&strip_json_comments(&content))
            .map_err(|e| Error::Config(format!("invalid JSON at {}: {}", path.display(), e)))?
    };

    if !value.is_object() {
        return Err(Error::Config(format!(
            "settings at {} must be an object",
            path.display()
        )));
    }

    // 전체 스키마에 맞는지는 병합 후 한 번 더 확인되지만,
    // 잘못된 파일을 어느 파일인지 알 수 있도록 여기서도 검사한다
    serde_json::from_value::<SkeinConfig>(value.clone())
        .map_err(|e| Error::Config(format!("invalid settings at {}: {}", path.display(), e)))?;

    debug!("Read settings layer {}", path.display());
    Ok(value)
}

/// 파일에서 설정 로드 (병합 없이)
pub fn load_config_from_file(path: &Path) -> Result<SkeinConfig> {
    let value = read_layer(path)?;
    serde_json::from_value(value).map_err(|e| Error::Config(e.to_string()))
}

/// 깊은 병합 - 객체는 키 단위, 그 외(배열 포함)는 later가 대체
pub fn merge_values(base: &mut Value, later: Value) {
    match (base, later) {
        (Value::Object(base_map), Value::Object(later_map)) => {
            for (key, value) in later_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// JSON 주석 제거 (`//`, `/* */`). 문자열 안은 건드리지 않는다.
pub fn strip_json_comments(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            output.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        output.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                output.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        output.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
            }
            _ => output.push(c),
        }
    }

    output
}

// ============================================================================
// 테스트
// ============================================================================
