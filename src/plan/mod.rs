//! 计划：类型、缓存、校验增强、生成

pub mod cache;
pub mod generator;
pub mod types;
pub mod validator;

pub use cache::{fingerprint, normalize_query, CacheStats, PlanCache};
pub use generator::PlanGenerator;
pub use types::*;
pub use validator::{validate_and_enhance, PlanDefaults, DEFAULT_CONFIDENCE, DEFAULT_STEP_TIME_MS};
