//! bee-planner 命令行
//!
//! 用法：bee-planner [--preview] [--config <path>] <query...>
//! 对内存演示邮箱执行（或只预览）一条自然语言请求，结果以 JSON 打印到 stdout。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bee_planner::agent::{AgentParams, AgentRuntime};
use bee_planner::agents::{EmailAgent, InMemoryMailbox};
use bee_planner::config::{load_config, AppConfig};
use bee_planner::observability;
use bee_planner::plan::QueryContext;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "bee-planner")]
#[command(about = "Plan and run a natural-language email request against a demo mailbox")]
#[command(version)]
struct Args {
    /// 只生成计划与风险评估，不执行
    #[arg(long)]
    preview: bool,

    /// 额外的配置文件
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 自然语言请求
    #[arg(required = true, trailing_var_arg = true)]
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let args = Args::parse();

    // 配置文件有误时按默认配置继续
    let cfg = load_config(args.config.clone()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        AppConfig::default()
    });

    let mailbox = Arc::new(InMemoryMailbox::demo("me@example.com"));
    let runtime = AgentRuntime::from_config(EmailAgent::new(mailbox), &cfg);
    tracing::info!(
        ai_planning = runtime.ai_planning_available(),
        provider = %cfg.llm.provider,
        "bee-planner ready"
    );

    let params = AgentParams::new(args.query.join(" "), QueryContext::new("cli", "local"));
    let output = if args.preview {
        serde_json::to_string_pretty(&runtime.preview(params).await)
    } else {
        serde_json::to_string_pretty(&runtime.process(params).await)
    }
    .context("Failed to serialize response")?;

    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_before_query_words() {
        let args = Args::try_parse_from([
            "bee-planner",
            "--preview",
            "--config",
            "local.toml",
            "read",
            "msg-1",
        ])
        .unwrap();
        assert!(args.preview);
        assert_eq!(args.config, Some(PathBuf::from("local.toml")));
        assert_eq!(args.query.join(" "), "read msg-1");
    }

    #[test]
    fn test_flag_like_words_inside_query_stay_in_query() {
        let args = Args::try_parse_from(["bee-planner", "find", "mail", "from", "-h", "--preview"])
            .unwrap();
        assert!(!args.preview);
        assert_eq!(args.query.join(" "), "find mail from -h --preview");
    }

    #[test]
    fn test_missing_query_is_an_error() {
        assert!(Args::try_parse_from(["bee-planner", "--preview"]).is_err());
    }
}
