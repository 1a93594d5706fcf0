//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预设回复；脚本耗尽后回退到默认回复：system 消息带 schema 时生成只含 think 步骤的计划 JSON，
//! 否则返回纯文本。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{GenerationOptions, LlmClient, LlmError, Message, Role};

/// Mock 客户端：脚本化回复 + 调用计数
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定回复
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    /// 追加一条失败回复
    pub fn push_error(self, err: LlmError) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(err));
        }
        self
    }

    /// 每次调用前等待，用于超时测试
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_scripted(&self) -> Option<Result<String, LlmError>> {
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(scripted) = self.next_scripted() {
            return scripted;
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        let wants_plan = messages
            .iter()
            .any(|m| matches!(m.role, Role::System) && m.content.contains("schema"));
        if !wants_plan {
            return Ok(format!("Mock response to: {last_user}"));
        }

        let plan = serde_json::json!({
            "steps": [{
                "id": "step_1",
                "tool": "think",
                "description": "Reason about the request",
                "parameters": { "prompt": last_user }
            }],
            "confidence": 0.6,
            "reasoning": "Mock plan"
        });
        Ok(plan.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_default() {
        let mock = MockLlmClient::with_responses(["first"]).push_error(LlmError::Api("boom".into()));
        let opts = GenerationOptions::default();
        let msgs = [Message::system("Use this schema"), Message::user("hello")];

        assert_eq!(mock.complete(&msgs, &opts).await.unwrap(), "first");
        assert!(mock.complete(&msgs, &opts).await.is_err());
        let fallback = mock.complete(&msgs, &opts).await.unwrap();
        assert!(fallback.contains("think"));
        assert!(fallback.contains("hello"));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_default_reply_is_plan_only_when_schema_requested() {
        let mock = MockLlmClient::new();
        let opts = GenerationOptions::default();

        let text = mock
            .complete(&[Message::system("Answer briefly"), Message::user("draft a note")], &opts)
            .await
            .unwrap();
        assert_eq!(text, "Mock response to: draft a note");
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_err());

        let plan = mock
            .complete(
                &[Message::system("Respond matching this schema: {}"), Message::user("plan it")],
                &opts,
            )
            .await
            .unwrap();
        let plan: serde_json::Value = serde_json::from_str(&plan).unwrap();
        assert_eq!(plan["steps"][0]["tool"], "think");
    }
}
