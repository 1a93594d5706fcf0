//! 计划校验与增强
//!
//! 把推理服务的原始 JSON 规范化为 Plan：补 plan id 与步骤 id、置信度截断到 [0,1]（缺省 0.5）、
//! 未给耗时的步骤按默认值（5000ms）计入总耗时、requiresConfirmation 取各步骤 OR。
//! 空步骤列表、步骤格式错误、重复 id、引用不存在的依赖都视为 invalid plan structure，直接拒绝不重试。
//! 环路不在这里检查，由执行器在运行前发现。

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::core::PlanError;
use crate::plan::{Plan, PlanStep};
use crate::tools::ToolRegistry;

pub const DEFAULT_STEP_TIME_MS: u64 = 5000;
pub const DEFAULT_CONFIDENCE: f64 = 0.5;
/// 单步耗时估计上限（24 小时）
pub const MAX_STEP_TIME_MS: u64 = 24 * 60 * 60 * 1000;
const DEFAULT_FALLBACK_STRATEGY: &str = "manual_execution";

/// 缺省值设置（来自 [planning] 配置）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanDefaults {
    pub step_time_ms: u64,
    pub confidence: f64,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            step_time_ms: DEFAULT_STEP_TIME_MS,
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPlan {
    id: Option<String>,
    steps: Option<Value>,
    confidence: Option<f64>,
    reasoning: Option<String>,
    #[serde(alias = "fallback_strategy", alias = "fallback")]
    fallback_strategy: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    #[serde(default, alias = "stepId")]
    id: Option<Value>,
    #[serde(alias = "toolName", alias = "action")]
    tool: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "params", alias = "args")]
    parameters: Option<Value>,
    #[serde(default, alias = "dependsOn", alias = "depends_on")]
    dependencies: Option<Vec<Value>>,
    #[serde(default, alias = "estimatedTimeMs", alias = "estimated_time")]
    estimated_time: Option<f64>,
    #[serde(default, alias = "requires_confirmation")]
    requires_confirmation: Option<bool>,
}

/// 步骤 id 允许字符串或数字
fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 校验并增强原始计划
pub fn validate_and_enhance(
    raw: Value,
    query: &str,
    registry: &ToolRegistry,
    defaults: PlanDefaults,
) -> Result<Plan, PlanError> {
    let raw = match raw {
        // 兼容 {"plan": {...}} 包裹与直接返回步骤数组
        Value::Object(mut map) if map.get("plan").map(Value::is_object).unwrap_or(false) => {
            map.remove("plan").unwrap_or(Value::Null)
        }
        Value::Array(steps) => serde_json::json!({ "steps": steps }),
        other => other,
    };
    if !raw.is_object() {
        return Err(PlanError::invalid_structure("plan is not a JSON object"));
    }

    let plan: RawPlan = serde_json::from_value(raw)
        .map_err(|e| PlanError::invalid_structure(e.to_string()))?;

    let raw_steps = match plan.steps {
        Some(Value::Array(steps)) if !steps.is_empty() => steps,
        Some(Value::Array(_)) | None => {
            return Err(PlanError::invalid_structure("empty step list"))
        }
        Some(_) => return Err(PlanError::invalid_structure("steps is not an array")),
    };

    let mut steps = Vec::with_capacity(raw_steps.len());
    let mut seen = HashSet::new();
    for (index, raw_step) in raw_steps.into_iter().enumerate() {
        let step: RawStep = serde_json::from_value(raw_step)
            .map_err(|e| PlanError::invalid_structure(format!("step {}: {e}", index + 1)))?;

        let tool = step.tool.trim().to_string();
        if tool.is_empty() {
            return Err(PlanError::invalid_structure(format!(
                "step {} has no tool",
                index + 1
            )));
        }

        let id = step
            .id
            .as_ref()
            .and_then(id_from_value)
            .unwrap_or_else(|| format!("step_{}", index + 1));
        if !seen.insert(id.clone()) {
            return Err(PlanError::invalid_structure(format!("duplicate step id '{id}'")));
        }

        let parameters = match step.parameters {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(obj @ Value::Object(_)) => obj,
            Some(_) => {
                return Err(PlanError::invalid_structure(format!(
                    "parameters of step '{id}' must be an object"
                )))
            }
        };

        let depends_on = step
            .dependencies
            .unwrap_or_default()
            .iter()
            .map(|d| {
                id_from_value(d).ok_or_else(|| {
                    PlanError::invalid_structure(format!("bad dependency id in step '{id}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let estimated_time_ms = step
            .estimated_time
            .filter(|t| t.is_finite() && *t > 0.0)
            .map(|t| t.round().min(MAX_STEP_TIME_MS as f64) as u64)
            .unwrap_or(defaults.step_time_ms)
            .min(MAX_STEP_TIME_MS);

        let tool_requires_confirmation = registry
            .resolve(&tool)
            .map(|t| t.requires_confirmation)
            .unwrap_or(false);

        steps.push(PlanStep {
            description: step.description.unwrap_or_else(|| format!("Run {tool}")),
            requires_confirmation: step.requires_confirmation.unwrap_or(false)
                || tool_requires_confirmation,
            id,
            tool,
            parameters,
            depends_on,
            estimated_time_ms,
        });
    }

    for step in &steps {
        if let Some(missing) = step.depends_on.iter().find(|d| !seen.contains(*d)) {
            return Err(PlanError::invalid_structure(format!(
                "step '{}' depends on unknown step '{}'",
                step.id, missing
            )));
        }
    }

    let confidence = plan
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(defaults.confidence)
        .clamp(0.0, 1.0);

    Ok(Plan {
        id: plan
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("plan-{}", uuid::Uuid::new_v4())),
        query: query.to_string(),
        total_estimated_time_ms: steps
            .iter()
            .map(|s| s.estimated_time_ms)
            .fold(0u64, u64::saturating_add),
        requires_confirmation: steps.iter().any(|s| s.requires_confirmation),
        steps,
        confidence,
        reasoning: plan.reasoning.unwrap_or_default(),
        fallback_strategy: plan
            .fallback_strategy
            .unwrap_or_else(|| DEFAULT_FALLBACK_STRATEGY.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolSpec;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(ToolSpec::new("send_email", "Send").requires_confirmation(true));
        r.register(ToolSpec::new("search_emails", "Search"));
        r
    }

    fn validate(raw: Value) -> Result<Plan, PlanError> {
        validate_and_enhance(raw, "query", &registry(), PlanDefaults::default())
    }

    #[test]
    fn test_defaults_are_applied() {
        let plan = validate(json!({
            "steps": [
                { "tool": "search_emails", "parameters": { "query": "invoice" } },
                { "tool": "think", "dependencies": ["step_1"], "estimatedTime": 1500 }
            ]
        }))
        .unwrap();

        assert!(plan.id.starts_with("plan-"));
        assert_eq!(plan.confidence, 0.5);
        assert_eq!(plan.steps[0].id, "step_1");
        assert_eq!(plan.steps[1].id, "step_2");
        assert_eq!(plan.total_estimated_time_ms, 5000 + 1500);
        assert!(!plan.requires_confirmation);
        assert_eq!(plan.fallback_strategy, "manual_execution");
        assert_eq!(plan.query, "query");
    }

    #[test]
    fn test_confidence_is_clamped() {
        let high = validate(json!({ "confidence": 3.2, "steps": [{ "tool": "think" }] })).unwrap();
        let low = validate(json!({ "confidence": -1, "steps": [{ "tool": "think" }] })).unwrap();
        assert_eq!(high.confidence, 1.0);
        assert_eq!(low.confidence, 0.0);
    }

    #[test]
    fn test_confirmation_is_or_across_steps_and_tools() {
        let plan = validate(json!({
            "id": "given",
            "steps": [
                { "id": "a", "tool": "think" },
                { "id": "b", "tool": "send_email", "dependencies": ["a"] }
            ]
        }))
        .unwrap();
        assert_eq!(plan.id, "given");
        assert!(!plan.steps[0].requires_confirmation);
        assert!(plan.steps[1].requires_confirmation);
        assert!(plan.requires_confirmation);
    }

    #[test]
    fn test_empty_or_malformed_steps_are_rejected() {
        for raw in [
            json!({ "steps": [] }),
            json!({ "confidence": 0.9 }),
            json!({ "steps": "do it" }),
            json!({ "steps": [{ "description": "no tool" }] }),
            json!({ "steps": [{ "tool": "think", "parameters": "text" }] }),
            json!("just text"),
        ] {
            let err = validate(raw).unwrap_err();
            assert!(err.to_string().contains("invalid plan structure"), "{err}");
            assert!(err.allows_fallback());
        }
    }

    #[test]
    fn test_duplicate_and_dangling_ids_are_rejected() {
        let dup = validate(json!({ "steps": [
            { "id": "a", "tool": "think" }, { "id": "a", "tool": "think" }
        ]}));
        assert!(dup.unwrap_err().to_string().contains("duplicate step id"));

        let dangling = validate(json!({ "steps": [
            { "id": "a", "tool": "think", "dependsOn": ["ghost"] }
        ]}));
        assert!(dangling.unwrap_err().to_string().contains("ghost"));
    }

    #[test]
    fn test_accepts_wrapped_plan_and_numeric_ids() {
        let plan = validate(json!({ "plan": { "steps": [
            { "id": 1, "tool": "think" },
            { "id": 2, "tool": "think", "dependencies": [1] }
        ]}}))
        .unwrap();
        assert_eq!(plan.steps[1].depends_on, vec!["1".to_string()]);

        let bare = validate(json!([{ "tool": "think" }])).unwrap();
        assert_eq!(bare.steps.len(), 1);
    }

    #[test]
    fn test_huge_time_estimates_are_capped() {
        let plan = validate(json!({ "steps": [
            { "tool": "think", "estimatedTime": 1e19 },
            { "tool": "think", "estimatedTime": 1e19 }
        ]}))
        .unwrap();
        assert_eq!(plan.steps[0].estimated_time_ms, MAX_STEP_TIME_MS);
        assert_eq!(plan.total_estimated_time_ms, 2 * MAX_STEP_TIME_MS);

        let huge_default = PlanDefaults {
            step_time_ms: u64::MAX,
            ..PlanDefaults::default()
        };
        let plan = validate_and_enhance(
            json!({ "steps": [{ "tool": "think" }, { "tool": "think" }] }),
            "query",
            &registry(),
            huge_default,
        )
        .unwrap();
        assert_eq!(plan.total_estimated_time_ms, 2 * MAX_STEP_TIME_MS);
    }

    #[test]
    fn test_unknown_tool_is_kept_for_executor() {
        let plan = validate(json!({ "steps": [{ "tool": "teleport" }] })).unwrap();
        assert_eq!(plan.steps[0].tool, "teleport");
        assert!(!plan.requires_confirmation);
    }
}
