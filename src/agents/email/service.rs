//! 邮件服务（外部协作方）与内存实现
//!
//! 真实部署中由 Gmail / IMAP 等适配器实现 MailService；InMemoryMailbox 供测试与 CLI 演示。

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub id: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub received_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
}

/// 待发送邮件
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailService: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<EmailMessage, String>;

    /// 按主题 / 正文 / 发件人检索，最新的在前
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<EmailMessage>, String>;

    async fn get(&self, id: &str) -> Result<Option<EmailMessage>, String>;

    async fn reply(&self, id: &str, body: &str) -> Result<EmailMessage, String>;
}

/// 内存邮箱
pub struct InMemoryMailbox {
    owner: String,
    inbox: RwLock<Vec<EmailMessage>>,
    sent: RwLock<Vec<EmailMessage>>,
    next_id: AtomicU64,
}

impl InMemoryMailbox {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            inbox: RwLock::new(Vec::new()),
            sent: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1000),
        }
    }

    pub fn with_messages(owner: impl Into<String>, messages: Vec<EmailMessage>) -> Self {
        Self {
            inbox: RwLock::new(messages),
            ..Self::new(owner)
        }
    }

    /// 一组演示邮件
    pub fn demo(owner: impl Into<String>) -> Self {
        let owner = owner.into();
        let now = chrono::Utc::now().timestamp_millis();
        let msg = |id: &str, from: &str, subject: &str, body: &str, age_min: i64| EmailMessage {
            id: id.to_string(),
            from: from.to_string(),
            to: vec![owner.clone()],
            subject: subject.to_string(),
            body: body.to_string(),
            received_at: now - age_min * 60_000,
            in_reply_to: None,
        };
        let messages = vec![
            msg("msg-1", "alice@example.com", "Q3 invoice", "Please find the Q3 invoice attached.", 30),
            msg("msg-2", "bob@example.com", "Lunch on Friday?", "Are you free for lunch on Friday?", 90),
            msg("msg-3", "billing@vendor.com", "Invoice overdue", "Invoice #4411 is overdue by 5 days.", 600),
        ];
        Self::with_messages(owner, messages)
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.read().await.clone()
    }

    fn next_id(&self) -> String {
        format!("msg-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl MailService for InMemoryMailbox {
    async fn send(&self, email: OutgoingEmail) -> Result<EmailMessage, String> {
        if email.to.is_empty() {
            return Err("no recipients".to_string());
        }
        if let Some(bad) = email.to.iter().find(|addr| !addr.contains('@')) {
            return Err(format!("invalid recipient address: {bad}"));
        }
        let message = EmailMessage {
            id: self.next_id(),
            from: self.owner.clone(),
            to: email.to,
            subject: email.subject,
            body: email.body,
            received_at: chrono::Utc::now().timestamp_millis(),
            in_reply_to: None,
        };
        self.sent.write().await.push(message.clone());
        Ok(message)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<EmailMessage>, String> {
        let needle = query.trim().to_lowercase();
        let mut hits: Vec<EmailMessage> = self
            .inbox
            .read()
            .await
            .iter()
            .filter(|m| {
                needle.is_empty()
                    || needle.split_whitespace().all(|term| {
                        m.subject.to_lowercase().contains(term)
                            || m.body.to_lowercase().contains(term)
                            || m.from.to_lowercase().contains(term)
                    })
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<EmailMessage>, String> {
        let inbox = self.inbox.read().await;
        if let Some(found) = inbox.iter().find(|m| m.id == id) {
            return Ok(Some(found.clone()));
        }
        drop(inbox);
        Ok(self.sent.read().await.iter().find(|m| m.id == id).cloned())
    }

    async fn reply(&self, id: &str, body: &str) -> Result<EmailMessage, String> {
        let original = self
            .get(id)
            .await?
            .ok_or_else(|| format!("message not found: {id}"))?;
        let subject = if original.subject.to_lowercase().starts_with("re:") {
            original.subject.clone()
        } else {
            format!("Re: {}", original.subject)
        };
        let mut message = self
            .send(OutgoingEmail {
                to: vec![original.from.clone()],
                subject,
                body: body.to_string(),
            })
            .await?;
        message.in_reply_to = Some(original.id);
        if let Some(stored) = self.sent.write().await.iter_mut().find(|m| m.id == message.id) {
            stored.in_reply_to = message.in_reply_to.clone();
        }
        Ok(message)
    }
}
