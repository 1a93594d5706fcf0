//! 依赖执行器
//!
//! 运行前先建依赖图（环路 / 悬空依赖直接报错，不产生任何 StepResult）；
//! 之后每轮取出就绪步骤（依赖均已有结果，成败不论），解析参数模板后分发：
//! think 走推理服务的自由文本生成，其余交给 Agent 的 StepDispatcher。
//! 单步失败只写入该步骤的 StepResult，其余步骤照常执行。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::config::DependencyFailurePolicy;
use crate::core::{PlanError, StepError};
use crate::plan::{Plan, PlanStep, QueryContext, StepId, StepResult};
use crate::reasoning::ReasoningClient;
use crate::tools::{ToolExecutor, ToolRegistry, THINK_TOOL};
use crate::workflow::{resolve_parameters, DependencyGraph};

const THINK_SYSTEM: &str =
    "You are the reasoning step of a larger plan. Answer the instruction directly and concisely, without preamble.";

/// Agent 自定义工具分发入口
#[async_trait]
pub trait StepDispatcher: Send + Sync {
    async fn dispatch(&self, tool: &str, params: Value, ctx: &QueryContext)
        -> Result<Value, StepError>;
}

/// 一次计划执行的全部结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanExecution {
    pub plan_id: String,
    pub results: HashMap<StepId, StepResult>,
    /// 结果写入顺序
    pub completion_order: Vec<StepId>,
    pub duration_ms: u64,
}

impl PlanExecution {
    pub fn get(&self, step_id: &str) -> Option<&StepResult> {
        self.results.get(step_id)
    }

    fn ordered(&self) -> impl Iterator<Item = &StepResult> {
        self.completion_order
            .iter()
            .filter_map(|id| self.results.get(id))
    }

    pub fn successful(&self) -> Vec<&StepResult> {
        self.ordered().filter(|r| r.success).collect()
    }

    pub fn failed(&self) -> Vec<&StepResult> {
        self.ordered().filter(|r| !r.success).collect()
    }
}

pub struct DependencyExecutor {
    reasoning: Option<Arc<dyn ReasoningClient>>,
    tool_executor: ToolExecutor,
    max_parallel: usize,
    policy: DependencyFailurePolicy,
}

impl DependencyExecutor {
    pub fn new(reasoning: Option<Arc<dyn ReasoningClient>>, tool_executor: ToolExecutor) -> Self {
        Self {
            reasoning,
            tool_executor,
            max_parallel: 1,
            policy: DependencyFailurePolicy::AlwaysAttempt,
        }
    }

    /// 同一批就绪步骤的最大并发数（至少 1）
    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    pub fn with_policy(mut self, policy: DependencyFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 按依赖顺序执行计划，每个步骤恰好产生一个 StepResult
    pub async fn execute(
        &self,
        plan: &Plan,
        query: &str,
        ctx: &QueryContext,
        registry: &ToolRegistry,
        dispatcher: &dyn StepDispatcher,
    ) -> Result<PlanExecution, PlanError> {
        let mut graph = DependencyGraph::new(&plan.steps)?;
        let steps: HashMap<&str, &PlanStep> =
            plan.steps.iter().map(|s| (s.id.as_str(), s)).collect();

        let start = Instant::now();
        let mut results: HashMap<StepId, StepResult> = HashMap::with_capacity(plan.steps.len());
        let mut completion_order = Vec::with_capacity(plan.steps.len());
        let mut ready: VecDeque<StepId> = graph.initial_ready().into();

        while !ready.is_empty() {
            let take = self.max_parallel.min(ready.len());
            let wave: Vec<&PlanStep> = ready
                .drain(..take)
                .filter_map(|id| steps.get(id.as_str()).copied())
                .collect();

            let outcomes = join_all(
                wave.iter()
                    .map(|step| self.run_step(step, query, ctx, registry, dispatcher, &results)),
            )
            .await;

            for result in outcomes {
                let id = result.step_id.clone();
                tracing::info!(
                    plan_id = %plan.id,
                    step_id = %id,
                    tool = %result.tool,
                    success = result.success,
                    duration_ms = result.duration_ms,
                    "step finished"
                );
                results.insert(id.clone(), result);
                completion_order.push(id.clone());
                ready.extend(graph.mark_completed(&id));
            }
        }

        Ok(PlanExecution {
            plan_id: plan.id.clone(),
            results,
            completion_order,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn run_step(
        &self,
        step: &PlanStep,
        query: &str,
        ctx: &QueryContext,
        registry: &ToolRegistry,
        dispatcher: &dyn StepDispatcher,
        results: &HashMap<StepId, StepResult>,
    ) -> StepResult {
        let started_at = chrono::Utc::now().timestamp_millis();
        let start = Instant::now();

        if self.policy == DependencyFailurePolicy::SkipDependents {
            if let Some(failed) = step
                .depends_on
                .iter()
                .find(|d| results.get(*d).map(|r| !r.success).unwrap_or(false))
            {
                return StepResult::failed(step, StepError::DependencyFailed(failed.clone()), started_at, 0);
            }
        }

        let params = resolve_parameters(&step.parameters, results);
        let outcome = match registry.resolve(&step.tool) {
            Err(e) => Err(e),
            Ok(_) if step.tool == THINK_TOOL => {
                self.tool_executor
                    .execute(&step.tool, &params, self.think(step, &params, query, results))
                    .await
            }
            Ok(_) => {
                self.tool_executor
                    .execute(&step.tool, &params, dispatcher.dispatch(&step.tool, params.clone(), ctx))
                    .await
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(output) => StepResult::succeeded(step, output, started_at, duration_ms),
            Err(e) => {
                tracing::warn!(step_id = %step.id, tool = %step.tool, error = %e, "step failed");
                StepResult::failed(step, e, started_at, duration_ms)
            }
        }
    }

    /// think：一次自由文本生成，输出 {"output": text}
    async fn think(
        &self,
        step: &PlanStep,
        params: &Value,
        query: &str,
        results: &HashMap<StepId, StepResult>,
    ) -> Result<Value, StepError> {
        let reasoning = self
            .reasoning
            .as_ref()
            .ok_or_else(|| StepError::Reasoning("reasoning client unavailable".to_string()))?;

        let instruction = params
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(step.description.as_str());

        let mut prompt = format!("Original request: {query}\nInstruction: {instruction}");
        let inputs: serde_json::Map<String, Value> = step
            .depends_on
            .iter()
            .filter_map(|d| {
                let output = results.get(d)?.output.clone()?;
                Some((d.clone(), output))
            })
            .collect();
        if !inputs.is_empty() {
            prompt.push_str(&format!("\nInputs from earlier steps: {}", Value::Object(inputs)));
        }

        let text = reasoning
            .generate_text(&prompt, THINK_SYSTEM)
            .await
            .map_err(|e| StepError::Reasoning(e.to_string()))?;
        Ok(serde_json::json!({ "output": text }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::reasoning::StructuredPlanRequest;
    use crate::tools::ToolSpec;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 记录分发顺序；tool 为 "boom" 时失败
    #[derive(Default)]
    struct RecordingDispatcher {
        calls: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl StepDispatcher for RecordingDispatcher {
        async fn dispatch(
            &self,
            tool: &str,
            params: Value,
            _ctx: &QueryContext,
        ) -> Result<Value, StepError> {
            self.calls.lock().unwrap().push(json!({ "tool": tool, "params": params.clone() }));
            match tool {
                "boom" => Err(StepError::ExecutionFailed("exploded".into())),
                "slow" => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(json!({}))
                }
                _ => Ok(json!({ "output": format!("{tool} done"), "params": params })),
            }
        }
    }

    struct EchoReasoner;

    #[async_trait]
    impl ReasoningClient for EchoReasoner {
        async fn generate_structured_plan(
            &self,
            _request: &StructuredPlanRequest,
        ) -> Result<Value, LlmError> {
            Err(LlmError::Unavailable("not used".into()))
        }

        async fn generate_text(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
            Ok(format!("thought about: {prompt}"))
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        for name in ["fetch", "boom", "send", "slow"] {
            r.register(ToolSpec::new(name, name));
        }
        r
    }

    fn plan(steps: Vec<PlanStep>) -> Plan {
        Plan {
            id: "plan-test".into(),
            query: "q".into(),
            total_estimated_time_ms: 0,
            requires_confirmation: false,
            confidence: 0.9,
            reasoning: String::new(),
            fallback_strategy: String::new(),
            steps,
        }
    }

    fn executor() -> DependencyExecutor {
        DependencyExecutor::new(Some(Arc::new(EchoReasoner)), ToolExecutor::new(5))
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let plan = plan(vec![
            PlanStep::new("s1", "fetch"),
            PlanStep::new("s2", "boom"),
            PlanStep::new("s3", "send"),
        ]);
        let dispatcher = RecordingDispatcher::default();
        let exec = executor()
            .execute(&plan, "q", &QueryContext::default(), &registry(), &dispatcher)
            .await
            .unwrap();

        assert_eq!(exec.results.len(), 3);
        assert!(exec.get("s1").unwrap().success);
        assert!(!exec.get("s2").unwrap().success);
        assert!(exec.get("s2").unwrap().error.as_ref().unwrap().contains("exploded"));
        assert!(exec.get("s3").unwrap().success);
        assert_eq!(exec.successful().len(), 2);
        assert_eq!(exec.failed().len(), 1);
    }

    #[tokio::test]
    async fn test_dependencies_order_execution() {
        // 声明顺序与依赖顺序相反
        let plan = plan(vec![
            PlanStep::new("c", "send").depends_on(["b"]),
            PlanStep::new("b", "fetch").depends_on(["a"]),
            PlanStep::new("a", "fetch"),
        ]);
        let exec = executor()
            .execute(&plan, "q", &QueryContext::default(), &registry(), &RecordingDispatcher::default())
            .await
            .unwrap();
        assert_eq!(exec.completion_order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_cycle_produces_no_results() {
        let plan = plan(vec![
            PlanStep::new("A", "fetch").depends_on(["B"]),
            PlanStep::new("B", "fetch").depends_on(["A"]),
        ]);
        let dispatcher = RecordingDispatcher::default();
        let err = executor()
            .execute(&plan, "q", &QueryContext::default(), &registry(), &dispatcher)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::CyclicDependency { .. }));
        assert!(dispatcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_template_uses_completed_output() {
        let plan = plan(vec![
            PlanStep::new("step1", "fetch"),
            PlanStep::new("step2", "send")
                .depends_on(["step1"])
                .with_parameters(json!({ "body": "{{step1.output}}", "other": "{{step1.missing}}" })),
        ]);
        let dispatcher = RecordingDispatcher::default();
        executor()
            .execute(&plan, "q", &QueryContext::default(), &registry(), &dispatcher)
            .await
            .unwrap();

        let calls = dispatcher.calls.lock().unwrap();
        assert_eq!(calls[1]["params"]["body"], "fetch done");
        assert_eq!(calls[1]["params"]["other"], "{{step1.missing}}");
    }

    #[tokio::test]
    async fn test_dependents_run_after_failed_dependency_by_default() {
        let plan = plan(vec![
            PlanStep::new("a", "boom"),
            PlanStep::new("b", "send").depends_on(["a"]),
        ]);
        let exec = executor()
            .execute(&plan, "q", &QueryContext::default(), &registry(), &RecordingDispatcher::default())
            .await
            .unwrap();
        assert!(!exec.get("a").unwrap().success);
        assert!(exec.get("b").unwrap().success);
    }

    #[tokio::test]
    async fn test_skip_dependents_policy() {
        let plan = plan(vec![
            PlanStep::new("a", "boom"),
            PlanStep::new("b", "send").depends_on(["a"]),
            PlanStep::new("c", "send").depends_on(["b"]),
        ]);
        let dispatcher = RecordingDispatcher::default();
        let exec = executor()
            .with_policy(DependencyFailurePolicy::SkipDependents)
            .execute(&plan, "q", &QueryContext::default(), &registry(), &dispatcher)
            .await
            .unwrap();

        assert_eq!(exec.results.len(), 3);
        let b = exec.get("b").unwrap();
        assert!(!b.success);
        assert!(b.error.as_ref().unwrap().contains("dependency 'a' failed"));
        assert!(exec.get("c").unwrap().error.as_ref().unwrap().contains("'b'"));
        assert_eq!(dispatcher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_dispatched() {
        let plan = plan(vec![PlanStep::new("x", "teleport"), PlanStep::new("y", "fetch")]);
        let dispatcher = RecordingDispatcher::default();
        let exec = executor()
            .execute(&plan, "q", &QueryContext::default(), &registry(), &dispatcher)
            .await
            .unwrap();
        assert_eq!(exec.get("x").unwrap().error.as_deref(), Some("Unknown tool: teleport"));
        assert!(exec.get("y").unwrap().success);
        assert_eq!(dispatcher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_think_uses_reasoning_and_dependency_outputs() {
        let plan = plan(vec![
            PlanStep::new("s1", "fetch"),
            PlanStep::new("s2", "think")
                .depends_on(["s1"])
                .with_parameters(json!({ "prompt": "summarize" })),
        ]);
        let exec = executor()
            .execute(&plan, "inbox", &QueryContext::default(), &registry(), &RecordingDispatcher::default())
            .await
            .unwrap();
        let out = exec.get("s2").unwrap().output.as_ref().unwrap()["output"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(out.contains("Instruction: summarize"));
        assert!(out.contains("fetch done"));
    }

    #[tokio::test]
    async fn test_think_without_reasoning_client_fails_step() {
        let plan = plan(vec![PlanStep::new("t", "think")]);
        let exec = DependencyExecutor::new(None, ToolExecutor::new(5))
            .execute(&plan, "q", &QueryContext::default(), &registry(), &RecordingDispatcher::default())
            .await
            .unwrap();
        assert!(!exec.get("t").unwrap().success);
    }

    #[tokio::test]
    async fn test_step_timeout_is_captured() {
        let plan = plan(vec![PlanStep::new("s", "slow"), PlanStep::new("f", "fetch")]);
        let exec = DependencyExecutor::new(None, ToolExecutor::with_timeout(Duration::from_millis(20)))
            .execute(&plan, "q", &QueryContext::default(), &registry(), &RecordingDispatcher::default())
            .await
            .unwrap();
        assert_eq!(exec.get("s").unwrap().error.as_deref(), Some("Tool timeout: slow"));
        assert!(exec.get("f").unwrap().success);
    }

    #[tokio::test]
    async fn test_parallel_waves_respect_dependencies() {
        let plan = plan(vec![
            PlanStep::new("a", "fetch"),
            PlanStep::new("b", "fetch"),
            PlanStep::new("c", "fetch"),
            PlanStep::new("d", "send").depends_on(["a", "b", "c"]),
        ]);
        let exec = executor()
            .with_max_parallel(4)
            .execute(&plan, "q", &QueryContext::default(), &registry(), &RecordingDispatcher::default())
            .await
            .unwrap();
        assert_eq!(exec.results.len(), 4);
        assert_eq!(exec.completion_order.last().map(String::as_str), Some("d"));
    }
}
