//! record.rs - Record-level context handed to strategies and conditions.
//!
//! The host logging framework owns its own event type; it projects the parts
//! masking decisions may depend on (level, channel, message, context) into a
//! [`RecordContext`] once per call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::MaskingError;

/// Severity of the log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = MaskingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "notice" => Ok(Self::Notice),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "alert" => Ok(Self::Alert),
            "emergency" => Ok(Self::Emergency),
            other => Err(MaskingError::InvalidConfiguration(format!("unknown log level '{}'", other))),
        }
    }
}

/// The record-level view available to conditional strategies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordContext {
    pub level: LogLevel,
    pub channel: String,
    pub message: String,
    pub context: Map<String, Value>,
}

impl RecordContext {
    pub fn new(level: LogLevel, channel: impl Into<String>) -> Self {
        Self {
            level,
            channel: channel.into(),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Looks up a dot-notation path in the record context.
    pub fn context_value(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.context.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// What a strategy decided for one leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskResult {
    /// Keep the given value in place of the original.
    Value(Value),
    /// Delete the entry from its parent container.
    Remove,
}

impl MaskResult {
    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Remove => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Remove => None,
        }
    }
}

impl From<Value> for MaskResult {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}
