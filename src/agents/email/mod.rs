//! 邮件 Agent
//!
//! 工具：send_email / reply_email（需确认）、read_email、search_emails、summarize_emails，外加内置 think。
//! 多步请求走 AI 规划；带消息 ID 的单一动作与规划失败时按关键词规则手动执行。

pub mod heuristics;
pub mod service;
pub mod tools;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{pick_primary, AgentParams, ExecutionSummary, PlanningAgent};
use crate::core::{AgentError, StepError};
use crate::plan::{QueryContext, StepResult};
use crate::tools::ToolSpec;

pub use heuristics::{needs_planning, parse_manual};
pub use service::{EmailMessage, InMemoryMailbox, MailService, OutgoingEmail};
pub use tools::{EmailCommand, EmailTool, Recipients, DEFAULT_SEARCH_LIMIT};

/// 归约时的主结果优先级
pub const OUTCOME_PREFERENCE: [&str; 5] = [
    "send_email",
    "reply_email",
    "read_email",
    "search_emails",
    "summarize_emails",
];

const EMAIL_INSTRUCTIONS: &str = "You plan email tasks. Search before reading or replying when no message id is given, \
and pass ids between steps with placeholders such as {{step_1.ids}} or {{step_1.emails.0.id}}. \
Use think to draft text before send_email or reply_email. Never send or reply unless the user asked for it.";

/// 单个邮件操作的结果；序列化后带 kind 标签，额外的 output 字段给模板引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmailOutcome {
    Sent {
        message: EmailMessage,
    },
    Replied {
        message: EmailMessage,
    },
    Read {
        email: EmailMessage,
    },
    Searched {
        query: String,
        count: usize,
        ids: Vec<String>,
        emails: Vec<EmailMessage>,
    },
    Summarized {
        count: usize,
        summary: String,
    },
}

impl EmailOutcome {
    /// 一句话描述
    pub fn headline(&self) -> String {
        match self {
            EmailOutcome::Sent { message } => {
                format!("Sent \"{}\" to {}", message.subject, message.to.join(", "))
            }
            EmailOutcome::Replied { message } => format!(
                "Replied to {} ({})",
                message.in_reply_to.as_deref().unwrap_or("unknown"),
                message.to.join(", ")
            ),
            EmailOutcome::Read { email } => format!("\"{}\" from {}", email.subject, email.from),
            EmailOutcome::Searched { count, query, .. } if query.is_empty() => {
                format!("Found {count} recent email(s)")
            }
            EmailOutcome::Searched { count, query, .. } => {
                format!("Found {count} email(s) matching \"{query}\"")
            }
            EmailOutcome::Summarized { summary, .. } => summary.clone(),
        }
    }

    fn to_step_output(&self) -> Result<Value, StepError> {
        let mut value =
            serde_json::to_value(self).map_err(|e| StepError::ExecutionFailed(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.insert("output".to_string(), Value::String(self.headline()));
        }
        Ok(value)
    }
}

/// Agent 对外的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailResult {
    pub outcome: EmailOutcome,
    pub message: String,
}

pub struct EmailAgent {
    mail: Arc<dyn MailService>,
}

impl EmailAgent {
    pub fn new(mail: Arc<dyn MailService>) -> Self {
        Self { mail }
    }

    pub fn mail(&self) -> &Arc<dyn MailService> {
        &self.mail
    }

    /// 执行一条已解析的邮件命令
    pub async fn run(&self, command: EmailCommand) -> Result<EmailOutcome, StepError> {
        let failed = |e: String| StepError::ExecutionFailed(e);
        match command {
            EmailCommand::Send(p) => {
                let message = self
                    .mail
                    .send(OutgoingEmail {
                        to: p.to.into_vec(),
                        subject: p.subject,
                        body: p.body,
                    })
                    .await
                    .map_err(failed)?;
                Ok(EmailOutcome::Sent { message })
            }
            EmailCommand::Reply(p) => {
                let message = self.mail.reply(&p.id, &p.body).await.map_err(failed)?;
                Ok(EmailOutcome::Replied { message })
            }
            EmailCommand::Read(p) => match self.mail.get(&p.id).await.map_err(failed)? {
                Some(email) => Ok(EmailOutcome::Read { email }),
                None => Err(StepError::ExecutionFailed(format!("message not found: {}", p.id))),
            },
            EmailCommand::Search(p) => {
                let emails = self
                    .mail
                    .search(&p.query, p.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
                    .await
                    .map_err(failed)?;
                Ok(EmailOutcome::Searched {
                    query: p.query,
                    count: emails.len(),
                    ids: emails.iter().map(|m| m.id.clone()).collect(),
                    emails,
                })
            }
            EmailCommand::Summarize(p) => {
                let limit = p.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
                let emails = if p.ids.is_empty() {
                    self.mail.search(&p.query, limit).await.map_err(failed)?
                } else {
                    let mut found = Vec::new();
                    for id in p.ids.iter().take(limit) {
                        match self.mail.get(id).await.map_err(failed)? {
                            Some(email) => found.push(email),
                            None => tracing::debug!(id = %id, "summarize: message not found, skipped"),
                        }
                    }
                    found
                };
                Ok(EmailOutcome::Summarized {
                    count: emails.len(),
                    summary: digest(&emails),
                })
            }
        }
    }
}

/// 确定性摘要：每封一行 "发件人: 主题"
fn digest(emails: &[EmailMessage]) -> String {
    if emails.is_empty() {
        return "No matching emails.".to_string();
    }
    let lines = emails
        .iter()
        .map(|m| format!("{}: {}", m.from, m.subject))
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} email(s): {lines}", emails.len())
}

#[async_trait]
impl PlanningAgent for EmailAgent {
    type Output = EmailResult;

    fn name(&self) -> &str {
        "email"
    }

    fn tools(&self) -> Vec<ToolSpec> {
        EmailTool::ALL.iter().map(|t| t.spec()).collect()
    }

    fn instructions(&self) -> &str {
        EMAIL_INSTRUCTIONS
    }

    fn can_use_ai_planning(&self, params: &AgentParams) -> bool {
        needs_planning(&params.query)
    }

    async fn execute_custom_tool(
        &self,
        tool: &str,
        params: Value,
        _ctx: &QueryContext,
    ) -> Result<Value, StepError> {
        let tool: EmailTool = tool.parse()?;
        let command = tool.parse_params(params)?;
        self.run(command).await?.to_step_output()
    }

    fn synthesize(
        &self,
        summary: &ExecutionSummary,
        successful: &[&StepResult],
        _failed: &[&StepResult],
    ) -> Result<EmailResult, AgentError> {
        let primary = pick_primary(successful, &OUTCOME_PREFERENCE)
            .ok_or_else(|| AgentError::AllStepsFailed(summary.failure_message()))?;
        let output = primary.output.clone().unwrap_or(Value::Null);
        let outcome: EmailOutcome = serde_json::from_value(output).map_err(|e| {
            AgentError::AllStepsFailed(format!(
                "step {} returned an unreadable result: {e}",
                primary.step_id
            ))
        })?;

        let message = if summary.all_succeeded() {
            format!("{} ({})", outcome.headline(), summary.describe())
        } else {
            format!("{} ({}; {})", outcome.headline(), summary.describe(), summary.failure_message())
        };
        Ok(EmailResult { outcome, message })
    }

    async fn execute_manually(&self, params: &AgentParams) -> Result<EmailResult, AgentError> {
        let command = parse_manual(&params.query)
            .ok_or_else(|| AgentError::Unrecognized(params.query.clone()))?;
        tracing::info!(query = %params.query, command = ?command, "manual email execution");
        let outcome = self
            .run(command)
            .await
            .map_err(|e| AgentError::Manual(e.to_string()))?;
        Ok(EmailResult {
            message: outcome.headline(),
            outcome,
        })
    }
}
