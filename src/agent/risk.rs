//! 预览风险评估
//!
//! 升级因素：置信度 < 0.7、步骤数 > 3、含需确认步骤。0 个因素为 low，1 个为 medium，2 个及以上为 high。

use serde::Serialize;

use crate::plan::Plan;

pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const MAX_SIMPLE_STEPS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// 命中的升级因素（人类可读）
    pub factors: Vec<String>,
}

pub fn assess_risk(plan: &Plan) -> RiskAssessment {
    let mut factors = Vec::new();

    if plan.confidence < LOW_CONFIDENCE_THRESHOLD {
        factors.push(format!("low confidence ({:.2})", plan.confidence));
    }
    if plan.steps.len() > MAX_SIMPLE_STEPS {
        factors.push(format!("{} steps", plan.steps.len()));
    }
    let confirmations = plan.confirmation_steps().count();
    if confirmations > 0 {
        factors.push(format!("{confirmations} step(s) require confirmation"));
    }

    let level = match factors.len() {
        0 => RiskLevel::Low,
        1 => RiskLevel::Medium,
        _ => RiskLevel::High,
    };
    RiskAssessment { level, factors }
}
