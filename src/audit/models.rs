use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

/// 审计日志条目
///
/// Built once per authenticated request and handed to an [`AuditSink`](super::AuditSink).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuditRecord {
    pub timestamp: DateTime<Local>,
    pub description: String,
    pub caller_identity: String,
    pub action: String,
    pub query_string: String,
    pub request_body: Option<String>,
}

impl AuditRecord {
    /// 创建新的审计日志条目
    pub fn new(description: impl Into<String>, caller_identity: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            description: description.into(),
            caller_identity: caller_identity.into(),
            action: String::new(),
            query_string: String::new(),
            request_body: None,
        }
    }

    /// 设置请求信息
    pub fn with_request(mut self, action: impl Into<String>, query_string: Option<&str>) -> Self {
        self.action = action.into();
        self.query_string = query_string.unwrap_or_default().to_string();
        self
    }

    /// 设置请求体；空字符串视为没有请求体
    pub fn with_body(mut self, body: Option<String>) -> Self {
        self.request_body = body.filter(|b| !b.is_empty());
        self
    }
}

/// One line per record:
/// `dd.MM.yyyy HH:mm:ss :: description :: identity :: action :: query :: body|null`.
/// Line breaks inside fields are escaped so a record never spans lines.
impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} :: {} :: {} :: {} :: {} :: {}",
            self.timestamp.format("%d.%m.%Y %H:%M:%S"),
            single_line(&self.description),
            single_line(&self.caller_identity),
            single_line(&self.action),
            single_line(&self.query_string),
            self.request_body
                .as_deref()
                .map(single_line)
                .unwrap_or_else(|| "null".to_string()),
        )
    }
}

fn single_line(value: &str) -> String {
    value.replace('\r', "\\r").replace('\n', "\\n")
}
