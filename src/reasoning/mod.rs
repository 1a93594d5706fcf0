//! 推理服务边界
//!
//! 执行器只依赖 ReasoningClient 这两个能力：结构化计划生成与自由文本生成。
//! 生产环境用 LlmReasoningClient 包装任意 LlmClient；测试可直接实现该 trait 得到确定性假实现。

pub mod json;
pub mod llm_adapter;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::AppConfig;
use crate::llm::{GenerationOptions, LlmClient, LlmError, MockLlmClient, OpenAiClient};

pub use json::extract_json;
pub use llm_adapter::LlmReasoningClient;

/// 结构化计划请求
#[derive(Debug, Clone)]
pub struct StructuredPlanRequest {
    pub prompt: String,
    pub system: String,
    /// 期望输出形状（JSON Schema）
    pub schema: Value,
    pub options: GenerationOptions,
}

/// 推理服务能力
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// 返回计划形状的 JSON；结构是否合法由调用方校验
    async fn generate_structured_plan(&self, request: &StructuredPlanRequest)
        -> Result<Value, LlmError>;

    async fn generate_text(&self, prompt: &str, system: &str) -> Result<String, LlmError>;
}

/// 按配置构建推理客户端；不可用（如缺少 API Key）时返回 None，此时 AI 规划整体关闭
pub fn create_reasoning_client(cfg: &AppConfig) -> Option<Arc<dyn ReasoningClient>> {
    let llm: Arc<dyn LlmClient> = match cfg.llm.provider.as_str() {
        "mock" => Arc::new(MockLlmClient::new()),
        "openai" => {
            let api_key = cfg
                .llm
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .filter(|k| !k.trim().is_empty());
            let Some(api_key) = api_key else {
                tracing::warn!("No API key configured, AI planning disabled");
                return None;
            };
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                &api_key,
            ))
        }
        other => {
            tracing::warn!(provider = %other, "Unknown LLM provider, AI planning disabled");
            return None;
        }
    };
    Some(Arc::new(LlmReasoningClient::new(llm, cfg.planning.generation_options())))
}
