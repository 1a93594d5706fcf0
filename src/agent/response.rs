//! 对调用层的输出契约：执行响应与预览响应（camelCase JSON）

use serde::Serialize;
use serde_json::Value;

use crate::agent::{ExecutionSummary, RiskAssessment};
use crate::plan::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    AiPlanned,
    Manual,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExecutionMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ExecutionSummary>,
}

impl<T> AgentResponse<T> {
    pub fn ok(result: T, mode: ExecutionMode, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            execution_time_ms,
            mode: Some(mode),
            summary: None,
        }
    }

    pub fn failed(error: impl Into<String>, mode: Option<ExecutionMode>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            execution_time_ms,
            mode,
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: ExecutionSummary) -> Self {
        self.summary = Some(summary);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStep {
    pub id: String,
    pub tool: String,
    pub description: String,
    pub depends_on: Vec<String>,
    pub estimated_time_ms: u64,
    pub requires_confirmation: bool,
}

/// 供外部人工审批的动作预览
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPreview {
    pub action_id: String,
    pub action_type: String,
    pub title: String,
    pub description: String,
    pub risk_assessment: RiskAssessment,
    pub steps: Vec<PreviewStep>,
    pub reversible: bool,
    pub parameters: Value,
    pub estimated_time_ms: u64,
    pub confidence: f64,
}

impl ActionPreview {
    pub fn from_plan(action_type: &str, plan: &Plan, risk: RiskAssessment) -> Self {
        let title: String = plan.query.chars().take(80).collect();
        let description = if plan.reasoning.trim().is_empty() {
            plan.steps
                .iter()
                .map(|s| s.description.as_str())
                .collect::<Vec<_>>()
                .join(" → ")
        } else {
            plan.reasoning.clone()
        };

        Self {
            action_id: format!("action-{}", uuid::Uuid::new_v4()),
            action_type: action_type.to_string(),
            title,
            description,
            risk_assessment: risk,
            steps: plan
                .steps
                .iter()
                .map(|s| PreviewStep {
                    id: s.id.clone(),
                    tool: s.tool.clone(),
                    description: s.description.clone(),
                    depends_on: s.depends_on.clone(),
                    estimated_time_ms: s.estimated_time_ms,
                    requires_confirmation: s.requires_confirmation,
                })
                .collect(),
            reversible: !plan.requires_confirmation,
            parameters: serde_json::json!({ "query": plan.query, "planId": plan.id }),
            estimated_time_ms: plan.total_estimated_time_ms,
            confidence: plan.confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub success: bool,
    pub awaiting_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<ActionPreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl PreviewResponse {
    pub fn ready(preview: ActionPreview, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            awaiting_confirmation: true,
            preview: Some(preview),
            error: None,
            execution_time_ms,
        }
    }

    pub fn failed(error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            awaiting_confirmation: false,
            preview: None,
            error: Some(error.into()),
            execution_time_ms,
        }
    }
}
