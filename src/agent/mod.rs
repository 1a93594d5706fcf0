//! Agent 层
//!
//! 具体 Agent 实现 PlanningAgent（工具清单、自定义工具分发、结果归约、规划资格判断、手动执行），
//! AgentRuntime 负责把它们串成：缓存 / 生成计划 → 依赖执行 → 归约；规划阶段失败回退手动执行。

pub mod response;
pub mod risk;
pub mod runtime;
pub mod summary;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::{AgentError, StepError};
use crate::plan::{QueryContext, StepResult};
use crate::tools::ToolSpec;

pub use response::{ActionPreview, AgentResponse, ExecutionMode, PreviewResponse, PreviewStep};
pub use risk::{assess_risk, RiskAssessment, RiskLevel};
pub use runtime::AgentRuntime;
pub use summary::{pick_primary, ExecutionSummary, StepFailure};

/// 单次请求
#[derive(Debug, Clone)]
pub struct AgentParams {
    pub query: String,
    pub context: QueryContext,
}

impl AgentParams {
    pub fn new(query: impl Into<String>, context: QueryContext) -> Self {
        Self {
            query: query.into(),
            context,
        }
    }
}

/// 具体 Agent 的扩展点
#[async_trait]
pub trait PlanningAgent: Send + Sync {
    /// 领域结果
    type Output: Serialize + Send + Sync;

    /// 预览中的 actionType
    fn name(&self) -> &str;

    /// 暴露给规划器的工具（think 由运行时自动注册）
    fn tools(&self) -> Vec<ToolSpec>;

    /// 追加到规划 system 指令后的领域说明
    fn instructions(&self) -> &str {
        ""
    }

    /// 该请求是否值得走 AI 规划（推理服务不可用时运行时不会调用）
    fn can_use_ai_planning(&self, params: &AgentParams) -> bool;

    /// 把工具名映射到真实操作；未知工具返回 StepError::UnknownTool
    async fn execute_custom_tool(
        &self,
        tool: &str,
        params: Value,
        ctx: &QueryContext,
    ) -> Result<Value, StepError>;

    /// 从异构步骤结果中挑出主结果；没有任何有意义的成功时返回 AgentError::AllStepsFailed
    fn synthesize(
        &self,
        summary: &ExecutionSummary,
        successful: &[&StepResult],
        failed: &[&StepResult],
    ) -> Result<Self::Output, AgentError>;

    /// 不依赖推理服务的确定性执行路径
    async fn execute_manually(&self, params: &AgentParams) -> Result<Self::Output, AgentError>;
}
