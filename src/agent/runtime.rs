//! Agent 运行时
//!
//! process：资格判断 → 生成计划（带缓存）→ 依赖执行 → 归约；生成阶段失败或不具备规划条件时走手动执行。
//! 环路等结构错误直接返回失败响应，不回退。对外永不返回 Err。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::{
    assess_risk, ActionPreview, AgentParams, AgentResponse, ExecutionMode, ExecutionSummary,
    PlanningAgent, PreviewResponse,
};
use crate::config::{AppConfig, PlanningSection};
use crate::core::{AgentError, PlanError, StepError};
use crate::plan::{CacheStats, Plan, PlanGenerator, QueryContext};
use crate::reasoning::{create_reasoning_client, ReasoningClient};
use crate::tools::{ToolExecutor, ToolRegistry};
use crate::workflow::{DependencyExecutor, DependencyGraph, PlanExecution, StepDispatcher};

/// 把 Agent 的自定义工具接到执行器
struct AgentDispatcher<'a, A> {
    agent: &'a A,
}

#[async_trait]
impl<'a, A: PlanningAgent> StepDispatcher for AgentDispatcher<'a, A> {
    async fn dispatch(
        &self,
        tool: &str,
        params: Value,
        ctx: &QueryContext,
    ) -> Result<Value, StepError> {
        self.agent.execute_custom_tool(tool, params, ctx).await
    }
}

pub struct AgentRuntime<A: PlanningAgent> {
    agent: A,
    registry: ToolRegistry,
    /// 推理服务不可用或规划关闭时为 None
    generator: Option<PlanGenerator>,
    executor: DependencyExecutor,
}

impl<A: PlanningAgent> AgentRuntime<A> {
    /// 构建运行时；工具在此一次性注册，之后只读
    pub fn new(
        agent: A,
        reasoning: Option<Arc<dyn ReasoningClient>>,
        planning: &PlanningSection,
    ) -> Self {
        let mut registry = ToolRegistry::new();
        for tool in agent.tools() {
            registry.register(tool);
        }

        let generator = match (&reasoning, planning.enabled) {
            (Some(client), true) => Some(PlanGenerator::new(
                Arc::clone(client),
                planning.generation_options(),
                planning.plan_defaults(),
            )),
            _ => {
                tracing::info!(agent = agent.name(), "AI planning disabled, manual execution only");
                None
            }
        };

        let executor = DependencyExecutor::new(reasoning, ToolExecutor::new(planning.step_timeout_secs))
            .with_max_parallel(planning.max_parallel_steps)
            .with_policy(planning.dependency_failure_policy);

        Self {
            agent,
            registry,
            generator,
            executor,
        }
    }

    /// 按配置创建推理客户端后构建
    pub fn from_config(agent: A, cfg: &AppConfig) -> Self {
        let reasoning = create_reasoning_client(cfg);
        Self::new(agent, reasoning, &cfg.planning)
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn ai_planning_available(&self) -> bool {
        self.generator.is_some()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.generator.as_ref().map(|g| g.cache().stats())
    }

    pub fn clear_cache(&self) {
        if let Some(generator) = &self.generator {
            generator.cache().clear();
        }
    }

    /// 生成（或从缓存取出）计划
    pub async fn generate_plan(&self, query: &str, ctx: &QueryContext) -> Result<Plan, PlanError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| PlanError::generation("reasoning client unavailable"))?;
        generator
            .generate(query, ctx, &self.registry, self.agent.instructions())
            .await
    }

    /// 按依赖执行计划
    pub async fn execute_plan(
        &self,
        plan: &Plan,
        query: &str,
        ctx: &QueryContext,
    ) -> Result<PlanExecution, PlanError> {
        let dispatcher = AgentDispatcher { agent: &self.agent };
        self.executor
            .execute(plan, query, ctx, &self.registry, &dispatcher)
            .await
    }

    /// 处理一条请求；任何失败都体现在 success=false 的响应里
    pub async fn process(&self, params: AgentParams) -> AgentResponse<A::Output> {
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        if self.generator.is_some() && self.agent.can_use_ai_planning(&params) {
            match self.run_planned(&params).await {
                Ok((output, summary)) => {
                    return AgentResponse::ok(output, ExecutionMode::AiPlanned, elapsed(start))
                        .with_summary(summary);
                }
                Err(AgentError::Plan(e)) if e.allows_fallback() => {
                    tracing::warn!(agent = self.agent.name(), error = %e, "falling back to manual execution");
                }
                Err(e) => {
                    tracing::error!(agent = self.agent.name(), error = %e, "planned execution failed");
                    return AgentResponse::failed(
                        e.to_string(),
                        Some(ExecutionMode::AiPlanned),
                        elapsed(start),
                    );
                }
            }
        }

        match self.agent.execute_manually(&params).await {
            Ok(output) => AgentResponse::ok(output, ExecutionMode::Manual, elapsed(start)),
            Err(e) => {
                tracing::warn!(agent = self.agent.name(), error = %e, "manual execution failed");
                AgentResponse::failed(e.to_string(), Some(ExecutionMode::Manual), elapsed(start))
            }
        }
    }

    async fn run_planned(
        &self,
        params: &AgentParams,
    ) -> Result<(A::Output, ExecutionSummary), AgentError> {
        let plan = self.generate_plan(&params.query, &params.context).await?;
        let execution = self
            .execute_plan(&plan, &params.query, &params.context)
            .await?;

        let summary = ExecutionSummary::new(&plan, &execution);
        tracing::info!(plan_id = %plan.id, summary = %summary.describe(), "plan executed");

        let successful = execution.successful();
        let failed = execution.failed();
        let output = self.agent.synthesize(&summary, &successful, &failed)?;
        Ok((output, summary))
    }

    /// 只生成计划并评估风险，不执行任何步骤
    pub async fn preview(&self, params: AgentParams) -> PreviewResponse {
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        let plan = match self.generate_plan(&params.query, &params.context).await {
            Ok(plan) => plan,
            Err(e) => return PreviewResponse::failed(e.to_string(), elapsed(start)),
        };
        // 结构非法的计划不交给人工审批
        if let Err(e) = DependencyGraph::new(&plan.steps) {
            return PreviewResponse::failed(e.to_string(), elapsed(start));
        }

        let risk = assess_risk(&plan);
        tracing::info!(plan_id = %plan.id, risk = ?risk.level, "plan preview");
        PreviewResponse::ready(
            ActionPreview::from_plan(self.agent.name(), &plan, risk),
            elapsed(start),
        )
    }
}
