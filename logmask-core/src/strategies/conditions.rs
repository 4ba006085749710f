//! Ready-made record predicates for [`super::ConditionalMaskingStrategy`]
//! and the engine's record-level conditional rules.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use super::conditional::Condition;
use crate::record::{LogLevel, RecordContext};

/// Wraps an infallible closure.
pub fn from_fn<F>(predicate: F) -> Condition
where
    F: Fn(&RecordContext) -> bool + Send + Sync + 'static,
{
    Arc::new(move |record: &RecordContext| -> anyhow::Result<bool> { Ok(predicate(record)) })
}

/// Satisfied when the record is at least as severe as `min`.
pub fn level_at_least(min: LogLevel) -> Condition {
    from_fn(move |record| record.level >= min)
}

/// Satisfied when the record's channel is one of `channels`.
pub fn channel_in<I, S>(channels: I) -> Condition
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let channels: HashSet<String> = channels.into_iter().map(Into::into).collect();
    from_fn(move |record| channels.contains(&record.channel))
}

/// Satisfied when the record context contains `path` (dot notation).
pub fn context_has_key(path: impl Into<String>) -> Condition {
    let path = path.into();
    from_fn(move |record| record.context_value(&path).is_some())
}

/// Satisfied when the context value at `path` equals `expected`.
pub fn context_field_equals(path: impl Into<String>, expected: Value) -> Condition {
    let path = path.into();
    from_fn(move |record| record.context_value(&path) == Some(&expected))
}
