//! # Configuration System
//!
//! 설정 타입은 Layer1 (`skein_foundation::SkeinConfig`)에 있고,
//! 여기서는 파일을 찾아 읽고 병합한다.
//!
//! ## 설정 우선순위 (낮은 → 높은)
//!
//! 1. User-level: `~/.skein/settings.json`
//! 2. Project-level: `.skein/settings.json`
//! 3. Local: `.skein/settings.local.json`
//! 4. `--config <file>`
//!
//! ## 사용 예시
//!
//! ```ignore
//! use skein_core::config::ConfigLoader;
//!
//! let config = ConfigLoader::new(Path::new("."))
//!     .with_explicit(PathBuf::from("ci.toml"))
//!     .load_all()?;
//!
//! for provider in config.gateway.enabled_providers() {
//!     // ...
//! }
//! ```

mod loader;

pub use loader::{
    load_config_from_file, merge_values, read_layer, strip_json_comments, ConfigLoader,
};
