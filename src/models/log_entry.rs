//! LogEntry entity (§3, §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
        };
        write!(f, "{}", s)
    }
}

pub const MESSAGE_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub script_name: String,
    pub level: LogLevel,
    pub message: String,
    pub context: Option<serde_json::Value>,
    pub action: Option<String>,
    pub duration_ms: Option<i64>,
}

impl LogEntry {
    pub fn new(source: impl Into<String>, script_name: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        let message: String = message.into();
        let truncated: String = message.chars().take(MESSAGE_MAX_CHARS).collect();
        Self {
            timestamp: Utc::now(),
            source: source.into(),
            script_name: script_name.into(),
            level,
            message: truncated,
            context: None,
            action: None,
            duration_ms: None,
        }
    }

    pub fn with_context(mut self, context: HashMap<String, serde_json::Value>) -> Self {
        self.context = Some(serde_json::to_value(context).unwrap_or(serde_json::Value::Null));
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_message_at_500_chars() {
        let entry = LogEntry::new("reddit_scraper", "main", LogLevel::Info, "x".repeat(600));
        assert_eq!(entry.message.chars().count(), MESSAGE_MAX_CHARS);
    }
}
