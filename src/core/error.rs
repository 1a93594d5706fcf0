//! 错误类型
//!
//! 只有 PlanError 会改变整体控制流（回退手动执行或中止计划）；
//! StepError 被执行器吸收进对应步骤的 StepResult，不会中断兄弟步骤。

use thiserror::Error;

use crate::llm::LlmError;

/// 计划层错误：生成失败（可回退手动执行）或结构非法（致命）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    /// 推理服务报错、超时、输出格式错误或计划结构非法
    #[error("Plan generation failed: {reason}")]
    Generation {
        reason: String,
        fallback_to_manual: bool,
    },

    #[error("Cyclic dependency detected among steps: {}", .steps.join(", "))]
    CyclicDependency { steps: Vec<String> },

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),
}

impl PlanError {
    /// 生成阶段失败，允许回退到手动执行
    pub fn generation(reason: impl Into<String>) -> Self {
        PlanError::Generation {
            reason: reason.into(),
            fallback_to_manual: true,
        }
    }

    /// 计划结构非法：同样回退手动执行，但不重试
    pub fn invalid_structure(detail: impl Into<String>) -> Self {
        Self::generation(format!("invalid plan structure: {}", detail.into()))
    }

    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            PlanError::Generation {
                fallback_to_manual: true,
                ..
            }
        )
    }
}

impl From<LlmError> for PlanError {
    fn from(err: LlmError) -> Self {
        PlanError::generation(err.to_string())
    }
}

/// 单步执行错误（记录进 StepResult，不向上传播）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters for {tool}: {message}")]
    InvalidParameters { tool: String, message: String },

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    Timeout(String),

    #[error("Reasoning failed: {0}")]
    Reasoning(String),

    #[error("Skipped: dependency '{0}' failed")]
    DependencyFailed(String),
}

impl StepError {
    pub fn invalid_params(tool: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StepError::InvalidParameters {
            tool: tool.into(),
            message: err.to_string(),
        }
    }
}

/// Agent 级错误；AgentRuntime 最终统一转成 success=false 的响应
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// 手动执行无法识别该请求
    #[error("Unrecognized request: {0}")]
    Unrecognized(String),

    #[error("Manual execution failed: {0}")]
    Manual(String),

    /// 没有任何有意义的操作成功
    #[error("{0}")]
    AllStepsFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_failure_allows_fallback() {
        let err = PlanError::generation("provider down");
        assert!(err.allows_fallback());
        assert!(err.to_string().contains("provider down"));
    }

    #[test]
    fn test_invalid_structure_message() {
        let err = PlanError::invalid_structure("empty step list");
        assert!(err.allows_fallback());
        assert!(err.to_string().contains("invalid plan structure"));
    }

    #[test]
    fn test_cycle_is_not_recoverable() {
        let err = PlanError::CyclicDependency {
            steps: vec!["a".into(), "b".into()],
        };
        assert!(!err.allows_fallback());
        assert_eq!(err.to_string(), "Cyclic dependency detected among steps: a, b");
    }

    #[test]
    fn test_llm_error_becomes_generation_failure() {
        let err: PlanError = LlmError::Timeout(30).into();
        assert!(err.allows_fallback());
    }
}
