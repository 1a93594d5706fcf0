//! Bee Planner - 多步请求的 AI 规划与依赖执行引擎
//!
//! 模块划分：
//! - **agent**: PlanningAgent 扩展点与 AgentRuntime（规划 → 执行 → 归约，失败回退手动执行，预览）
//! - **agents**: 具体 Agent（邮件）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: 日志初始化
//! - **plan**: 计划类型、生成、校验增强与缓存
//! - **reasoning**: 结构化推理服务抽象
//! - **tools**: 工具注册表、计划 Schema、单步执行器
//! - **workflow**: 依赖图、参数模板与依赖执行器

pub mod agent;
pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod reasoning;
pub mod tools;
pub mod workflow;

pub use agent::{AgentParams, AgentResponse, AgentRuntime, PlanningAgent, PreviewResponse};
pub use config::{load_config, AppConfig};
pub use plan::{Plan, PlanStep, QueryContext, StepResult};
