//! 关键词规则：规划资格判断与手动执行的意图解析
//!
//! 不依赖推理服务，结果完全由查询文本决定。

use std::sync::OnceLock;

use regex::Regex;

use super::tools::{
    EmailCommand, ReadEmailParams, Recipients, ReplyEmailParams, SearchEmailsParams,
    SendEmailParams, SummarizeEmailsParams,
};

/// 超过该长度的查询默认值得规划
pub const LONG_QUERY_CHARS: usize = 120;

const ACTION_VERBS: &[&str] = &[
    "send", "reply", "forward", "search", "find", "read", "open", "summarize", "summarise",
    "draft", "write", "compose", "list",
];

const SEQUENCING_WORDS: &[&str] = &["then", "after", "afterwards"];

const READ_VERBS: &[&str] = &["read", "open", "show", "view"];
const SEND_VERBS: &[&str] = &["send", "email", "mail", "write"];
const SEARCH_VERBS: &[&str] = &["find", "search", "look", "list", "show"];
const SUMMARIZE_VERBS: &[&str] = &["summarize", "summarise", "summary", "digest"];

/// 搜索 / 摘要时从关键词里剔除的虚词
const FILLER: &[&str] = &[
    "find", "search", "look", "list", "show", "summarize", "summarise", "summary", "digest", "for",
    "me", "my", "the", "all", "a", "an", "of", "in", "inbox", "email", "emails", "mail", "mails",
    "message", "messages", "about", "from", "please", "up", "and", "then", "them", "it", "to",
];

const DEFAULT_REPLY_BODY: &str = "Thanks, received.";

fn message_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bmsg-[A-Za-z0-9_]+\b")
            .unwrap_or_else(|e| panic!("message id regex is invalid: {e}"))
    })
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")
            .unwrap_or_else(|e| panic!("address regex is invalid: {e}"))
    })
}

fn words(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .collect()
}

fn has_any(words: &[&str], set: &[&str]) -> bool {
    words.iter().any(|w| set.contains(w))
}

/// 查询中第一个消息 ID
pub fn message_id(query: &str) -> Option<&str> {
    message_id_re().find(query).map(|m| m.as_str())
}

pub fn addresses(query: &str) -> Vec<String> {
    address_re()
        .find_iter(query)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .collect()
}

/// 去重后的动作动词，按出现顺序
pub fn action_verbs(query: &str) -> Vec<String> {
    let lower = query.to_ascii_lowercase();
    let mut found: Vec<String> = Vec::new();
    for w in words(&lower) {
        if ACTION_VERBS.contains(&w) && !found.iter().any(|f| f == w) {
            found.push(w.to_string());
        }
    }
    found
}

/// 是否值得走 AI 规划
///
/// 带消息 ID 的单一动作直接手动执行；多个动作、顺序连接词或长查询才规划。
pub fn needs_planning(query: &str) -> bool {
    let verbs = action_verbs(query).len();
    if message_id(query).is_some() && verbs <= 1 {
        return false;
    }
    if verbs >= 2 {
        return true;
    }
    let lower = query.to_ascii_lowercase();
    if verbs == 1 && has_any(&words(&lower), SEQUENCING_WORDS) {
        return true;
    }
    query.chars().count() > LONG_QUERY_CHARS
}

/// 关键词之后的原文片段（大小写不敏感）
fn text_after<'a>(query: &'a str, keyword: &str) -> Option<&'a str> {
    let lower = query.to_ascii_lowercase();
    let pos = lower.find(keyword)?;
    let rest = query[pos + keyword.len()..].trim();
    (!rest.is_empty()).then_some(rest)
}

/// "saying …" 或第一个冒号之后的正文
fn body_text(query: &str) -> Option<String> {
    text_after(query, " saying ")
        .or_else(|| query.split_once(':').map(|(_, rest)| rest.trim()).filter(|r| !r.is_empty()))
        .map(|s| s.trim_matches(|c| c == '"' || c == '\'').to_string())
}

fn subject_text(query: &str) -> Option<String> {
    let rest = text_after(query, " about ")?;
    let lower = rest.to_ascii_lowercase();
    let end = [lower.find(" saying "), rest.find(':')]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(rest.len());
    let subject = rest[..end].trim().trim_end_matches(['.', ',']);
    (!subject.is_empty()).then(|| subject.to_string())
}

fn keywords(query: &str) -> String {
    let lower = query.to_ascii_lowercase();
    words(&lower)
        .into_iter()
        .filter(|w| !FILLER.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 手动执行：把查询解析为单个邮件命令，无法识别返回 None
pub fn parse_manual(query: &str) -> Option<EmailCommand> {
    let lower = query.to_ascii_lowercase();
    let words = words(&lower);
    let id = message_id(query);

    if let Some(id) = id {
        if words.contains(&"reply") {
            return Some(EmailCommand::Reply(ReplyEmailParams {
                id: id.to_string(),
                body: body_text(query).unwrap_or_else(|| DEFAULT_REPLY_BODY.to_string()),
            }));
        }
        if has_any(&words, READ_VERBS) {
            return Some(EmailCommand::Read(ReadEmailParams { id: id.to_string() }));
        }
    }

    let to = addresses(query);
    if !to.is_empty() && has_any(&words, SEND_VERBS) {
        let subject = subject_text(query).unwrap_or_else(|| "(no subject)".to_string());
        let body = body_text(query).unwrap_or_else(|| subject.clone());
        return Some(EmailCommand::Send(SendEmailParams {
            to: Recipients::Many(to),
            subject,
            body,
        }));
    }

    if has_any(&words, SEARCH_VERBS) {
        return Some(EmailCommand::Search(SearchEmailsParams {
            query: keywords(query),
            limit: None,
        }));
    }

    if has_any(&words, SUMMARIZE_VERBS) {
        return Some(EmailCommand::Summarize(SummarizeEmailsParams {
            query: keywords(query),
            ids: Vec::new(),
            limit: None,
        }));
    }

    // 只给了 ID
    id.map(|id| EmailCommand::Read(ReadEmailParams { id: id.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_action_with_id_is_not_planned() {
        assert!(!needs_planning("read msg-1"));
        assert!(!needs_planning("reply to msg-2 saying see you then"));
    }

    #[test]
    fn test_multi_action_and_sequencing_are_planned() {
        assert!(needs_planning("find the invoice emails and summarize them"));
        assert!(needs_planning("search for invoices then wait"));
        assert!(needs_planning("read msg-1 and reply to it"));
        assert!(!needs_planning("search invoices"));
        assert!(!needs_planning("search invoices and receipts"));
        assert!(needs_planning(&format!("search {}", "invoice ".repeat(20))));
    }

    #[test]
    fn test_parse_reply_with_body() {
        let cmd = parse_manual("Reply to msg-2 saying: Friday works").unwrap();
        assert_eq!(
            cmd,
            EmailCommand::Reply(ReplyEmailParams {
                id: "msg-2".into(),
                body: "Friday works".into()
            })
        );
    }

    #[test]
    fn test_parse_read_and_bare_id() {
        let expected = EmailCommand::Read(ReadEmailParams { id: "msg-3".into() });
        assert_eq!(parse_manual("open msg-3").unwrap(), expected);
        assert_eq!(parse_manual("msg-3").unwrap(), expected);
    }

    #[test]
    fn test_parse_send_takes_subject_from_about() {
        let cmd = parse_manual("Send an email to bob@example.com about the Q3 report saying it is ready").unwrap();
        match cmd {
            EmailCommand::Send(p) => {
                assert_eq!(p.to.into_vec(), vec!["bob@example.com"]);
                assert_eq!(p.subject, "the Q3 report");
                assert_eq!(p.body, "it is ready");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_search_and_summarize_keywords() {
        assert_eq!(
            parse_manual("find my emails about invoice").unwrap(),
            EmailCommand::Search(SearchEmailsParams {
                query: "invoice".into(),
                limit: None
            })
        );
        assert!(matches!(
            parse_manual("summarize my inbox"),
            Some(EmailCommand::Summarize(SummarizeEmailsParams { ref query, .. })) if query.is_empty()
        ));
    }

    #[test]
    fn test_unrecognized() {
        assert!(parse_manual("what's the weather like").is_none());
    }
}
