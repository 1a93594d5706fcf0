//! 工具注册表
//!
//! 保存 Agent 暴露给规划器的全部工具元数据（名称、描述、参数 schema、耗时估计、是否需确认、能力 / 限制标签），
//! 始终包含内置的纯推理工具 think。按名注册，重名后写覆盖；注册顺序保留，保证 prompt 稳定。

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::core::StepError;

/// 内置推理工具名
pub const THINK_TOOL: &str = "think";

/// 工具元数据
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// 参数 JSON Schema
    pub parameters: Value,
    pub estimated_time_ms: u64,
    pub requires_confirmation: bool,
    pub capabilities: Vec<String>,
    pub limitations: Vec<String>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            estimated_time_ms: 1000,
            requires_confirmation: false,
            capabilities: Vec::new(),
            limitations: Vec::new(),
        }
    }

    pub fn parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }

    pub fn estimated_time_ms(mut self, ms: u64) -> Self {
        self.estimated_time_ms = ms;
        self
    }

    pub fn requires_confirmation(mut self, yes: bool) -> Self {
        self.requires_confirmation = yes;
        self
    }

    pub fn capabilities<I: IntoIterator<Item = S>, S: Into<String>>(mut self, tags: I) -> Self {
        self.capabilities = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn limitations<I: IntoIterator<Item = S>, S: Into<String>>(mut self, tags: I) -> Self {
        self.limitations = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// think：无副作用，永不需要确认
pub fn think_tool() -> ToolSpec {
    ToolSpec::new(
        THINK_TOOL,
        "Reason about intermediate results or draft text without side effects. Args: {\"prompt\": \"what to think about\"}",
    )
    .parameters(serde_json::json!({
        "type": "object",
        "properties": { "prompt": { "type": "string" } },
        "required": ["prompt"]
    }))
    .estimated_time_ms(2000)
    .capabilities(["reasoning", "drafting", "analysis"])
    .limitations(["no side effects", "cannot access external data"])
}

/// 工具注册表：按名称存储 ToolSpec，支持 register / list / resolve
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolSpec>,
    order: Vec<String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// 新注册表，已包含 think
    pub fn new() -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
            order: Vec::new(),
        };
        registry.register(think_tool());
        registry
    }

    /// 注册工具；同名则覆盖
    pub fn register(&mut self, tool: ToolSpec) {
        if !self.tools.contains_key(&tool.name) {
            self.order.push(tool.name.clone());
        } else {
            tracing::debug!(tool = %tool.name, "tool re-registered, overwriting");
        }
        self.tools.insert(tool.name.clone(), tool);
    }

    /// 按注册顺序返回快照
    pub fn list(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect()
    }

    pub fn resolve(&self, name: &str) -> Result<&ToolSpec, StepError> {
        self.tools
            .get(name)
            .ok_or_else(|| StepError::UnknownTool(name.to_string()))
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 生成 prompt 中的 Available tools 段落
    pub fn to_prompt_section(&self) -> String {
        self.list()
            .iter()
            .map(|t| {
                let mut line = format!(
                    "- {}: {}\n  parameters: {}\n  estimatedTimeMs: {}, requiresConfirmation: {}",
                    t.name, t.description, t.parameters, t.estimated_time_ms, t.requires_confirmation
                );
                if !t.capabilities.is_empty() {
                    line.push_str(&format!("\n  capabilities: {}", t.capabilities.join(", ")));
                }
                if !t.limitations.is_empty() {
                    line.push_str(&format!("\n  limitations: {}", t.limitations.join(", ")));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
