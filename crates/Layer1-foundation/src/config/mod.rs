//! Config - 통합 설정 관리
//!
//! - `settings.rs` - SkeinConfig 통합 설정 (runtime, relay, gateway, model)
//! - `selection.rs` - 런별 도구 선택 / 실행 전략
//! - `gateway.rs` - 외부 도구 제공자 설정
//!
//! 파일 로딩과 병합은 Layer2-core의 `ConfigLoader`가 담당한다.

mod gateway;
mod selection;
mod settings;

pub use gateway::{GatewayProviderConfig, GatewaySettings, TransportConfig};
pub use selection::{ExecutionStrategy, ToolSelection};
pub use settings::{ModelSettings, RelaySettings, RuntimeSettings, SkeinConfig, CONFIG_DIR_NAME};
