//! 邮件工具：封闭枚举 + 强类型参数
//!
//! 规划器给出的工具名先解析成 EmailTool，参数再反序列化为对应结构体；两步都失败在单个步骤内。

use std::str::FromStr;

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::core::StepError;
use crate::tools::ToolSpec;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmailTool {
    SendEmail,
    SearchEmails,
    ReadEmail,
    ReplyEmail,
    SummarizeEmails,
}

impl EmailTool {
    pub const ALL: [EmailTool; 5] = [
        EmailTool::SendEmail,
        EmailTool::SearchEmails,
        EmailTool::ReadEmail,
        EmailTool::ReplyEmail,
        EmailTool::SummarizeEmails,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EmailTool::SendEmail => "send_email",
            EmailTool::SearchEmails => "search_emails",
            EmailTool::ReadEmail => "read_email",
            EmailTool::ReplyEmail => "reply_email",
            EmailTool::SummarizeEmails => "summarize_emails",
        }
    }

    /// 注册给规划器的元数据
    pub fn spec(self) -> ToolSpec {
        match self {
            EmailTool::SendEmail => ToolSpec::new(self.name(), "Send a new email to one or more recipients")
                .parameters(schema_value::<SendEmailParams>())
                .estimated_time_ms(3000)
                .requires_confirmation(true)
                .capabilities(["compose", "deliver"])
                .limitations(["irreversible once sent"]),
            EmailTool::SearchEmails => {
                ToolSpec::new(self.name(), "Search the inbox by keywords in subject, body or sender; newest first")
                    .parameters(schema_value::<SearchEmailsParams>())
                    .estimated_time_ms(2000)
                    .capabilities(["search", "list"])
                    .limitations(["inbox only"])
            }
            EmailTool::ReadEmail => ToolSpec::new(self.name(), "Read one email by its id (msg-…)")
                .parameters(schema_value::<ReadEmailParams>())
                .estimated_time_ms(1000)
                .capabilities(["read"]),
            EmailTool::ReplyEmail => ToolSpec::new(self.name(), "Reply to the sender of an existing email")
                .parameters(schema_value::<ReplyEmailParams>())
                .estimated_time_ms(3000)
                .requires_confirmation(true)
                .capabilities(["reply", "deliver"])
                .limitations(["irreversible once sent"]),
            EmailTool::SummarizeEmails => ToolSpec::new(
                self.name(),
                "Summarize matching emails, or the given ids, as a short digest",
            )
            .parameters(schema_value::<SummarizeEmailsParams>())
            .estimated_time_ms(4000)
            .capabilities(["summarize", "digest"]),
        }
    }

    /// 参数反序列化为对应命令
    pub fn parse_params(self, params: Value) -> Result<EmailCommand, StepError> {
        let invalid = |e: serde_json::Error| StepError::invalid_params(self.name(), e);
        let command = match self {
            EmailTool::SendEmail => EmailCommand::Send(serde_json::from_value(params).map_err(invalid)?),
            EmailTool::SearchEmails => EmailCommand::Search(serde_json::from_value(params).map_err(invalid)?),
            EmailTool::ReadEmail => EmailCommand::Read(serde_json::from_value(params).map_err(invalid)?),
            EmailTool::ReplyEmail => EmailCommand::Reply(serde_json::from_value(params).map_err(invalid)?),
            EmailTool::SummarizeEmails => {
                EmailCommand::Summarize(serde_json::from_value(params).map_err(invalid)?)
            }
        };
        Ok(command)
    }
}

impl FromStr for EmailTool {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmailTool::ALL
            .into_iter()
            .find(|tool| tool.name() == s)
            .ok_or_else(|| StepError::UnknownTool(s.to_string()))
    }
}

fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}

/// 收件人：单个字符串（可逗号分隔）或数组
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    pub fn into_vec(self) -> Vec<String> {
        let raw = match self {
            Recipients::One(s) => s.split([',', ';']).map(str::to_string).collect(),
            Recipients::Many(v) => v,
        };
        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct SendEmailParams {
    #[serde(alias = "recipient", alias = "recipients")]
    pub to: Recipients,
    #[serde(default)]
    pub subject: String,
    #[serde(default, alias = "content")]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct SearchEmailsParams {
    /// 关键词，空串返回最新邮件
    #[serde(default, alias = "keywords")]
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct ReadEmailParams {
    #[serde(alias = "messageId", alias = "message_id", alias = "emailId")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct ReplyEmailParams {
    #[serde(alias = "messageId", alias = "message_id", alias = "emailId")]
    pub id: String,
    #[serde(alias = "content", alias = "message")]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct SummarizeEmailsParams {
    #[serde(default)]
    pub query: String,
    /// 指定时只摘要这些邮件，可用 "{{step_1.ids}}" 引用搜索结果
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmailCommand {
    Send(SendEmailParams),
    Search(SearchEmailsParams),
    Read(ReadEmailParams),
    Reply(ReplyEmailParams),
    Summarize(SummarizeEmailsParams),
}
