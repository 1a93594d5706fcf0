//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：按 GenerationOptions 完成一次对话。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// 调用 LLM 时的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 超时（秒）
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),

    #[error("LLM unavailable: {0}")]
    Unavailable(String),
}

/// 单次生成参数：温度、最大输出 token、超时
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 2000,
            timeout: Duration::from_secs(30),
        }
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
