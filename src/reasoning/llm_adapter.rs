//! LlmClient → ReasoningClient 适配
//!
//! 结构化计划：system 指令 + 期望 schema 拼成 system 消息，要求只输出 JSON，再从回复中提取 JSON。
//! 自由文本：system + user 两条消息，直接返回文本。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{GenerationOptions, LlmClient, LlmError, Message};
use crate::reasoning::{extract_json, ReasoningClient, StructuredPlanRequest};

pub struct LlmReasoningClient {
    llm: Arc<dyn LlmClient>,
    /// generate_text 使用的参数
    text_options: GenerationOptions,
}

impl LlmReasoningClient {
    pub fn new(llm: Arc<dyn LlmClient>, text_options: GenerationOptions) -> Self {
        Self { llm, text_options }
    }

    fn log_usage(&self, kind: &str) {
        let (prompt, completion, total) = self.llm.token_usage();
        tracing::debug!(
            kind,
            prompt_tokens = prompt,
            completion_tokens = completion,
            total_tokens = total,
            "reasoning call finished"
        );
    }
}

#[async_trait]
impl ReasoningClient for LlmReasoningClient {
    async fn generate_structured_plan(
        &self,
        request: &StructuredPlanRequest,
    ) -> Result<Value, LlmError> {
        let schema = serde_json::to_string_pretty(&request.schema)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let system = format!(
            "{}\n\nRespond with a single JSON object matching this schema and nothing else:\n{}",
            request.system, schema
        );
        let messages = [Message::system(system), Message::user(request.prompt.clone())];
        let output = self.llm.complete(&messages, &request.options).await?;
        self.log_usage("structured_plan");
        extract_json(&output)
    }

    async fn generate_text(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let messages = [Message::system(system), Message::user(prompt)];
        let text = self.llm.complete(&messages, &self.text_options).await?;
        self.log_usage("text");
        Ok(text.trim().to_string())
    }
}
