//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__PLANNING__TIMEOUT_SECS=10`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::GenerationOptions;
use crate::plan::PlanDefaults;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub planning: PlanningSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// 依赖步骤失败时，下游步骤的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyFailurePolicy {
    /// 依赖只约束顺序，无论成败都执行下游
    #[default]
    AlwaysAttempt,
    /// 依赖失败则下游直接记为失败，不再分发
    SkipDependents,
}

/// [planning] 段：规划与执行参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanningSection {
    pub enabled: bool,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// 计划生成超时（秒）
    pub timeout_secs: u64,
    pub default_step_time_ms: u64,
    pub default_confidence: f64,
    /// 同一批就绪步骤最多并发数；1 表示逐个执行
    pub max_parallel_steps: usize,
    pub dependency_failure_policy: DependencyFailurePolicy,
    /// 单步工具调用超时（秒）
    pub step_timeout_secs: u64,
}

impl Default for PlanningSection {
    fn default() -> Self {
        Self {
            enabled: true,
            temperature: 0.2,
            max_output_tokens: 2000,
            timeout_secs: 30,
            default_step_time_ms: 5000,
            default_confidence: 0.5,
            max_parallel_steps: 1,
            dependency_failure_policy: DependencyFailurePolicy::AlwaysAttempt,
            step_timeout_secs: 30,
        }
    }
}

impl PlanningSection {
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn plan_defaults(&self) -> PlanDefaults {
        PlanDefaults {
            step_time_ms: self.default_step_time_ms,
            confidence: self.default_confidence,
        }
    }
}

/// 从 config 目录加载配置，环境变量 BEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
