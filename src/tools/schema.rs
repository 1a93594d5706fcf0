//! 计划输出 JSON Schema（schemars 自动生成）
//!
//! 作为 expected-shape schema 传给推理服务，并拼入 system prompt，减少 LLM 输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 规划器应输出的计划格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(rename_all = "camelCase")]
struct PlanFormat {
    /// 按执行意图排列的步骤
    pub steps: Vec<StepFormat>,
    /// 0 到 1 之间的把握程度
    pub confidence: f64,
    /// 为何这样拆分
    pub reasoning: String,
    /// 计划失败时的处理方式
    pub fallback_strategy: Option<String>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(rename_all = "camelCase")]
struct StepFormat {
    /// 计划内唯一，如 step_1
    pub id: String,
    /// 已注册工具名
    pub tool: String,
    pub description: String,
    /// 工具参数；可用 "{{step_1.field}}" 引用前序步骤输出
    pub parameters: HashMap<String, Value>,
    /// 依赖的步骤 ID
    pub dependencies: Vec<String>,
    pub estimated_time: Option<u64>,
    pub requires_confirmation: Option<bool>,
}

/// 返回计划 JSON Schema
pub fn plan_schema() -> Value {
    serde_json::to_value(schema_for!(PlanFormat)).unwrap_or(Value::Null)
}

/// 美化后的 schema 文本，可拼入 system prompt
pub fn plan_schema_json() -> String {
    serde_json::to_string_pretty(&plan_schema()).unwrap_or_default()
}
