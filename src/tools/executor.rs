//! 工具执行器
//!
//! 对每次工具分发施加超时，超时转为 StepError::Timeout；每次调用输出结构化审计日志（JSON）。

use std::future::Future;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::StepError;

/// 工具执行器：对每次调用施加超时并记录审计日志
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    timeout: Duration,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new(30)
    }
}

impl ToolExecutor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 在超时内等待 call；输出 JSON 审计日志
    pub async fn execute<F>(&self, tool_name: &str, args: &Value, call: F) -> Result<Value, StepError>
    where
        F: Future<Output = Result<Value, StepError>>,
    {
        let start = Instant::now();
        let result = timeout(self.timeout, call).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "step_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(inner) => inner,
            Err(_) => Err(StepError::Timeout(tool_name.to_string())),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_result() {
        let executor = ToolExecutor::new(5);
        let args = serde_json::json!({"text": "hi"});
        let out = executor
            .execute("echo", &args, async { Ok(serde_json::json!({"output": "hi"})) })
            .await
            .unwrap();
        assert_eq!(out["output"], "hi");

        let err = executor
            .execute("echo", &args, async {
                Err(StepError::ExecutionFailed("nope".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, StepError::ExecutionFailed("nope".into()));
    }

    #[tokio::test]
    async fn test_timeout() {
        let executor = ToolExecutor::with_timeout(Duration::from_millis(10));
        let err = executor
            .execute("slow", &Value::Null, async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Value::Null)
            })
            .await
            .unwrap_err();
        assert_eq!(err, StepError::Timeout("slow".to_string()));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = Value::String("x".repeat(500));
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
    }
}
