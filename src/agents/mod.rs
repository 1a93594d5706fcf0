//! 具体 Agent 实现

pub mod email;

pub use email::{EmailAgent, EmailOutcome, EmailResult, InMemoryMailbox, MailService};
