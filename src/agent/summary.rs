//! 执行摘要与结果归约辅助

use serde::Serialize;

use crate::plan::{Plan, StepResult};
use crate::workflow::PlanExecution;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub step_id: String,
    pub tool: String,
    pub error: String,
}

/// 计划执行概况，交给 Agent 的 synthesize
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub plan_id: String,
    pub total_steps: usize,
    pub successful_steps: usize,
    /// 成功步骤 ID，按完成顺序
    pub succeeded: Vec<String>,
    pub failures: Vec<StepFailure>,
    /// 成功执行且需要确认的步骤数
    pub confirmation_steps: usize,
    pub duration_ms: u64,
}

impl ExecutionSummary {
    pub fn new(plan: &Plan, execution: &PlanExecution) -> Self {
        let failures = execution
            .failed()
            .into_iter()
            .map(|r| StepFailure {
                step_id: r.step_id.clone(),
                tool: r.tool.clone(),
                error: r.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            })
            .collect();
        let succeeded: Vec<String> = execution
            .successful()
            .into_iter()
            .map(|r| r.step_id.clone())
            .collect();
        Self {
            plan_id: plan.id.clone(),
            total_steps: plan.steps.len(),
            successful_steps: succeeded.len(),
            succeeded,
            failures,
            confirmation_steps: execution
                .results
                .values()
                .filter(|r| r.success && r.requires_confirmation)
                .count(),
            duration_ms: execution.duration_ms,
        }
    }

    /// "N/M successful steps"
    pub fn describe(&self) -> String {
        format!("{}/{} successful steps", self.successful_steps, self.total_steps)
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// 列出每个失败步骤及原因
    pub fn failure_message(&self) -> String {
        if self.failures.is_empty() {
            return format!("No operation produced a result ({})", self.describe());
        }
        let detail = self
            .failures
            .iter()
            .map(|f| format!("{} ({}): {}", f.step_id, f.tool, f.error))
            .collect::<Vec<_>>()
            .join("; ");
        format!("Failed operations: {detail} ({})", self.describe())
    }
}

/// 按工具优先级挑选主结果；preference 靠前者优先，同一工具取最后完成的一次
pub fn pick_primary<'a>(successful: &[&'a StepResult], preference: &[&str]) -> Option<&'a StepResult> {
    preference.iter().find_map(|tool| {
        successful
            .iter()
            .rev()
            .find(|r| r.tool == *tool)
            .copied()
    })
}
