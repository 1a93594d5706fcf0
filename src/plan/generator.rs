//! 计划生成
//!
//! generate(query, context)：指纹命中缓存直接返回；未命中则带超时调用推理服务，
//! 校验增强后写入缓存再返回。任何失败都是 PlanError::Generation（允许回退手动执行），本层不重试。

use std::sync::Arc;
use std::time::Instant;

use tokio::time::timeout;

use crate::core::PlanError;
use crate::llm::GenerationOptions;
use crate::plan::{fingerprint, validate_and_enhance, Plan, PlanCache, PlanDefaults, QueryContext};
use crate::reasoning::{ReasoningClient, StructuredPlanRequest};
use crate::tools::{plan_schema, ToolRegistry};

const PLANNER_SYSTEM: &str = "You are a planning engine. Break the user's request into the smallest set of tool invocations that accomplishes it. \
Only use the tools listed. Give every step a unique id and list the ids of steps whose output it needs in \"dependencies\". \
To pass an earlier step's output as a parameter, use the string \"{{step_id.field}}\". \
Use the \"think\" tool for drafting or reasoning that needs no side effects.";

pub struct PlanGenerator {
    reasoning: Arc<dyn ReasoningClient>,
    cache: PlanCache,
    options: GenerationOptions,
    defaults: PlanDefaults,
}

impl PlanGenerator {
    pub fn new(
        reasoning: Arc<dyn ReasoningClient>,
        options: GenerationOptions,
        defaults: PlanDefaults,
    ) -> Self {
        Self {
            reasoning,
            cache: PlanCache::new(),
            options,
            defaults,
        }
    }

    pub fn cache(&self) -> &PlanCache {
        &self.cache
    }

    pub fn reasoning(&self) -> &Arc<dyn ReasoningClient> {
        &self.reasoning
    }

    /// 生成（或从缓存取出）计划
    ///
    /// `instructions` 为 Agent 自身的领域说明，拼在通用规划指令之后。
    pub async fn generate(
        &self,
        query: &str,
        ctx: &QueryContext,
        registry: &ToolRegistry,
        instructions: &str,
    ) -> Result<Plan, PlanError> {
        let key = fingerprint(query);
        if let Some(plan) = self.cache.get(&key) {
            tracing::info!(plan_id = %plan.id, cache_hit = true, "plan served from cache");
            return Ok(plan);
        }

        let request = StructuredPlanRequest {
            prompt: build_prompt(query, ctx, registry),
            system: format!("{PLANNER_SYSTEM}\n\n{instructions}"),
            schema: plan_schema(),
            options: self.options.clone(),
        };

        let start = Instant::now();
        let raw = match timeout(
            self.options.timeout,
            self.reasoning.generate_structured_plan(&request),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "plan generation failed");
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.options.timeout.as_secs(), "plan generation timed out");
                return Err(PlanError::generation(format!(
                    "reasoning client timed out after {}ms",
                    self.options.timeout.as_millis()
                )));
            }
        };

        let plan = validate_and_enhance(raw, query, registry, self.defaults)?;
        tracing::info!(
            plan_id = %plan.id,
            steps = plan.steps.len(),
            confidence = plan.confidence,
            duration_ms = start.elapsed().as_millis() as u64,
            cache_hit = false,
            "plan generated"
        );

        self.cache.insert(key, plan.clone());
        Ok(plan)
    }
}

/// 规划 prompt：可用工具、用户上下文、前序结果与查询本身
fn build_prompt(query: &str, ctx: &QueryContext, registry: &ToolRegistry) -> String {
    let mut prompt = format!("Available tools:\n{}\n\n", registry.to_prompt_section());
    prompt.push_str(&format!(
        "Context: session={}, user={}, timestamp={}\n",
        ctx.session_id, ctx.user_id, ctx.timestamp
    ));
    if !ctx.prior_results.is_empty() {
        let prior = serde_json::to_string(&ctx.prior_results).unwrap_or_default();
        prompt.push_str(&format!("Previous results: {prior}\n"));
    }
    prompt.push_str(&format!("\nRequest: {query}"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedPlanner {
        reply: Result<Value, LlmError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedPlanner {
        fn ok(reply: Value) -> Self {
            Self {
                reply: Ok(reply),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReasoningClient for FixedPlanner {
        async fn generate_structured_plan(
            &self,
            _request: &StructuredPlanRequest,
        ) -> Result<Value, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply.clone()
        }

        async fn generate_text(&self, _prompt: &str, _system: &str) -> Result<String, LlmError> {
            Ok(String::new())
        }
    }

    fn generator(planner: Arc<FixedPlanner>, timeout: Duration) -> PlanGenerator {
        let options = GenerationOptions {
            timeout,
            ..GenerationOptions::default()
        };
        PlanGenerator::new(planner, options, PlanDefaults::default())
    }

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let planner = Arc::new(FixedPlanner::ok(json!({ "steps": [{ "tool": "think" }] })));
        let gen = generator(planner.clone(), Duration::from_secs(5));
        let registry = ToolRegistry::new();
        let ctx = QueryContext::new("s1", "u1");

        let first = gen.generate("Plan my Day", &ctx, &registry, "").await.unwrap();
        let second = gen.generate("  plan my   day ", &ctx, &registry, "").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(planner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gen.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_clear_forces_regeneration() {
        let planner = Arc::new(FixedPlanner::ok(json!({ "steps": [{ "tool": "think" }] })));
        let gen = generator(planner.clone(), Duration::from_secs(5));
        let registry = ToolRegistry::new();
        let ctx = QueryContext::default();

        let first = gen.generate("q", &ctx, &registry, "").await.unwrap();
        gen.cache().clear();
        let second = gen.generate("q", &ctx, &registry, "").await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(planner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_error_is_generation_failure() {
        let planner = Arc::new(FixedPlanner {
            reply: Err(LlmError::Api("overloaded".into())),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let gen = generator(planner, Duration::from_secs(5));
        let err = gen
            .generate("q", &QueryContext::default(), &ToolRegistry::new(), "")
            .await
            .unwrap_err();
        assert!(err.allows_fallback());
        assert!(gen.cache().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_generation_failure() {
        let planner = Arc::new(FixedPlanner {
            reply: Ok(json!({ "steps": [{ "tool": "think" }] })),
            delay: Duration::from_millis(300),
            calls: AtomicUsize::new(0),
        });
        let gen = generator(planner, Duration::from_millis(20));
        let err = gen
            .generate("q", &QueryContext::default(), &ToolRegistry::new(), "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(err.allows_fallback());
    }

    #[tokio::test]
    async fn test_invalid_structure_is_not_cached() {
        let planner = Arc::new(FixedPlanner::ok(json!({ "steps": [] })));
        let gen = generator(planner.clone(), Duration::from_secs(5));
        let registry = ToolRegistry::new();
        for _ in 0..2 {
            let err = gen
                .generate("q", &QueryContext::default(), &registry, "")
                .await
                .unwrap_err();
            assert!(err.to_string().contains("invalid plan structure"));
        }
        assert_eq!(planner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_prompt_includes_tools_and_context() {
        let mut ctx = QueryContext::new("sess", "alice");
        ctx.prior_results.push(json!({"sent": true}));
        let prompt = build_prompt("email bob", &ctx, &ToolRegistry::new());
        assert!(prompt.contains("- think:"));
        assert!(prompt.contains("user=alice"));
        assert!(prompt.contains("Previous results"));
        assert!(prompt.ends_with("Request: email bob"));
    }
}
