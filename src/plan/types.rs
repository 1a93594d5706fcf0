//! 计划类型定义
//!
//! Plan / PlanStep 由生成 + 校验增强得到，缓存后不可变；StepResult 由执行器按步骤 ID 写入一次。

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type PlanId = String;
pub type StepId = String;

/// 计划中的单个步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    /// 计划内唯一
    pub id: StepId,
    pub tool: String,
    pub description: String,
    /// 参数对象，值中可含 {{stepId.field}} 占位符
    pub parameters: Value,
    pub depends_on: Vec<StepId>,
    pub estimated_time_ms: u64,
    pub requires_confirmation: bool,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            description: String::new(),
            parameters: Value::Object(Default::default()),
            depends_on: Vec::new(),
            estimated_time_ms: 0,
            requires_confirmation: false,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_confirmation(mut self, requires_confirmation: bool) -> Self {
        self.requires_confirmation = requires_confirmation;
        self
    }
}

/// 已校验的执行计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    pub query: String,
    pub steps: Vec<PlanStep>,
    pub total_estimated_time_ms: u64,
    /// 任一步骤需要确认即为 true
    pub requires_confirmation: bool,
    /// 取值 [0, 1]
    pub confidence: f64,
    pub reasoning: String,
    pub fallback_strategy: String,
}

impl Plan {
    pub fn confirmation_steps(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(|s| s.requires_confirmation)
    }
}

/// 单步执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: StepId,
    pub tool: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub requires_confirmation: bool,
    /// 开始时间（毫秒时间戳）
    pub started_at: i64,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn succeeded(step: &PlanStep, output: Value, started_at: i64, duration_ms: u64) -> Self {
        Self {
            step_id: step.id.clone(),
            tool: step.tool.clone(),
            success: true,
            output: Some(output),
            error: None,
            requires_confirmation: step.requires_confirmation,
            started_at,
            duration_ms,
        }
    }

    pub fn failed(
        step: &PlanStep,
        error: impl std::fmt::Display,
        started_at: i64,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_id: step.id.clone(),
            tool: step.tool.clone(),
            success: false,
            output: None,
            error: Some(error.to_string()),
            requires_confirmation: step.requires_confirmation,
            started_at,
            duration_ms,
        }
    }
}

/// 调用方上下文：会话、用户、时间戳与可选的前序结果
///
/// 只进入 prompt，不进入缓存指纹。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    pub session_id: String,
    pub user_id: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prior_results: Vec<Value>,
}

impl QueryContext {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            prior_results: Vec::new(),
        }
    }
}
