// logmask-core/src/recovery.rs
//! Bounded retry with exponential backoff and type-aware fallback values for
//! failing masking operations.
//!
//! [`RecoveryStrategy::execute`] drives an explicit state machine:
//! `Attempting -> Succeeded | Exhausted`, after which the outcome is resolved
//! to `SUCCESS`, `RECOVERED`, `FALLBACK` or `FAILED`. Operations never
//! propagate an error or a panic to the caller as long as a failure mode is
//! configured.
//!
//! License: MIT OR APACHE 2.0

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::RetryConfig;
use crate::errors::{panic_message, MaskingError};
use crate::preview::redact_preview;

/// Literal used by [`FailureMode::FailClosed`].
pub const REDACTED_LITERAL: &str = "[REDACTED]";

/// How a masking failure resolves once retries are exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Return the original, unmasked value.
    FailOpen,
    /// Return [`REDACTED_LITERAL`] regardless of type.
    FailClosed,
    /// Return a type-shaped placeholder such as `[STRING:12 chars]`.
    #[default]
    FailSafe,
}

impl FailureMode {
    /// The value substituted for `original` under this mode.
    pub fn fallback_for(&self, original: &Value) -> Value {
        match self {
            Self::FailOpen => original.clone(),
            Self::FailClosed => Value::String(REDACTED_LITERAL.to_string()),
            Self::FailSafe => Value::String(shape_of(original)),
        }
    }
}

fn shape_of(value: &Value) -> String {
    match value {
        Value::String(s) => format!("[STRING:{} chars]", s.chars().count()),
        Value::Number(n) if n.is_f64() => "[FLOAT]".to_string(),
        Value::Number(_) => "[INT]".to_string(),
        Value::Bool(_) => "[BOOL]".to_string(),
        Value::Null => "[NULL]".to_string(),
        Value::Array(items) => format!("[ARRAY:{} items]", items.len()),
        Value::Object(map) => format!("[OBJECT:{} keys]", map.len()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStatus {
    /// The first attempt succeeded.
    Success,
    /// A later attempt succeeded.
    Recovered,
    /// Every attempt failed and the failure mode supplied a value.
    Fallback,
    /// Every attempt failed and no failure mode is configured.
    Failed,
}

#[derive(Debug, Clone)]
pub struct RecoveryOutcome<T> {
    pub status: RecoveryStatus,
    pub value: Option<T>,
    pub attempts: u32,
    pub elapsed: Duration,
    pub last_error: Option<MaskingError>,
}

impl<T> RecoveryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self.status, RecoveryStatus::Success | RecoveryStatus::Recovered)
    }

    /// The produced value, or the last error for a `FAILED` outcome.
    pub fn into_result(self) -> Result<T, MaskingError> {
        match (self.value, self.last_error) {
            (Some(value), _) => Ok(value),
            (None, Some(error)) => Err(error),
            (None, None) => Err(MaskingError::operation_failed(
                "recovery",
                "",
                "[none]",
                "finished without a value",
            )),
        }
    }

    /// A JSON object describing the outcome, suitable for audit records.
    pub fn to_audit_context(&self) -> Value {
        json!({
            "status": self.status,
            "attempts": self.attempts,
            "elapsed_ms": self.elapsed.as_millis() as u64,
            "error_kind": self.last_error.as_ref().map(MaskingError::kind_str),
            "error": self.last_error.as_ref().map(ToString::to_string),
        })
    }
}

enum Attempt<T> {
    Attempting(u32),
    Succeeded { value: T, attempts: u32 },
    Exhausted { error: MaskingError, attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryStrategy {
    retry: RetryConfig,
    failure_mode: Option<FailureMode>,
}

impl Default for RecoveryStrategy {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            failure_mode: Some(FailureMode::default()),
        }
    }
}

impl RecoveryStrategy {
    pub fn new(retry: RetryConfig, failure_mode: FailureMode) -> Result<Self, MaskingError> {
        retry.validate()?;
        Ok(Self {
            retry,
            failure_mode: Some(failure_mode),
        })
    }

    /// Exhausted operations resolve to `FAILED` instead of a fallback value.
    pub fn without_fallback(mut self) -> Self {
        self.failure_mode = None;
        self
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn failure_mode(&self) -> Option<FailureMode> {
        self.failure_mode
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let millis = self
            .retry
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.retry.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Runs `operation` until it succeeds, fails with a non-recoverable
    /// error, or `max_attempts` is reached. `original` and `path` feed the
    /// fallback value and diagnostics.
    pub fn execute<T, F>(&self, mut operation: F, original: &Value, path: &str) -> RecoveryOutcome<T>
    where
        T: From<Value>,
        F: FnMut() -> Result<T, MaskingError>,
    {
        let start = Instant::now();
        let mut last_error = None;
        let mut state = Attempt::Attempting(1);
        loop {
            state = match state {
                Attempt::Attempting(attempt) => match run_guarded(&mut operation, original, path) {
                    Ok(value) => Attempt::Succeeded { value, attempts: attempt },
                    Err(error) if !error.is_recoverable() || attempt >= self.retry.max_attempts => {
                        Attempt::Exhausted { error, attempts: attempt }
                    }
                    Err(error) => {
                        let delay = self.backoff_delay(attempt);
                        debug!(
                            "Masking at '{}' failed on attempt {} ({}); retrying in {:?}.",
                            path,
                            attempt,
                            error.kind_str(),
                            delay
                        );
                        last_error = Some(error);
                        if !delay.is_zero() {
                            thread::sleep(delay);
                        }
                        Attempt::Attempting(attempt + 1)
                    }
                },
                Attempt::Succeeded { value, attempts } => {
                    let status = if attempts == 1 {
                        RecoveryStatus::Success
                    } else {
                        RecoveryStatus::Recovered
                    };
                    return RecoveryOutcome {
                        status,
                        value: Some(value),
                        attempts,
                        elapsed: start.elapsed(),
                        last_error,
                    };
                }
                Attempt::Exhausted { error, attempts } => {
                    return self.resolve(error, attempts, original, path, start.elapsed());
                }
            };
        }
    }

    fn resolve<T: From<Value>>(
        &self,
        error: MaskingError,
        attempts: u32,
        original: &Value,
        path: &str,
        elapsed: Duration,
    ) -> RecoveryOutcome<T> {
        let (status, value) = match self.failure_mode {
            Some(mode) => {
                warn!(
                    "Masking at '{}' failed after {} attempt(s): {}. Applying {:?} fallback.",
                    path, attempts, error, mode
                );
                (RecoveryStatus::Fallback, Some(T::from(mode.fallback_for(original))))
            }
            None => {
                warn!("Masking at '{}' failed after {} attempt(s): {}.", path, attempts, error);
                (RecoveryStatus::Failed, None)
            }
        };
        RecoveryOutcome {
            status,
            value,
            attempts,
            elapsed,
            last_error: Some(error),
        }
    }
}

fn run_guarded<T, F>(operation: &mut F, original: &Value, path: &str) -> Result<T, MaskingError>
where
    F: FnMut() -> Result<T, MaskingError>,
{
    match catch_unwind(AssertUnwindSafe(|| operation())) {
        Ok(result) => result,
        Err(payload) => Err(MaskingError::operation_failed(
            "strategy",
            path,
            redact_preview(original),
            format!("panicked: {}", panic_message(payload)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PatternErrorKind;
    use crate::record::MaskResult;

    fn quick(mode: FailureMode) -> RecoveryStrategy {
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        };
        RecoveryStrategy::new(retry, mode).unwrap()
    }

    fn transient() -> MaskingError {
        MaskingError::operation_failed("callback", "a", "[string:3 chars]", "flaky")
    }

    #[test]
    fn test_always_failing_operation_falls_back_after_max_attempts() {
        let recovery = quick(FailureMode::FailSafe);
        let mut calls = 0;
        let outcome: RecoveryOutcome<Value> = recovery.execute(
            || {
                calls += 1;
                Err(transient())
            },
            &json!("abc"),
            "a",
        );
        assert_eq!(calls, 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.status, RecoveryStatus::Fallback);
        assert_eq!(outcome.value, Some(json!("[STRING:3 chars]")));
        assert!(outcome.last_error.is_some());
    }

    #[test]
    fn test_non_recoverable_error_is_not_retried() {
        let recovery = quick(FailureMode::FailClosed);
        let mut calls = 0;
        let outcome: RecoveryOutcome<Value> = recovery.execute(
            || {
                calls += 1;
                Err(MaskingError::invalid_pattern("(a+)+", PatternErrorKind::NestedQuantifier, "nested"))
            },
            &json!(42),
            "n",
        );
        assert_eq!(calls, 1);
        assert_eq!(outcome.value, Some(json!(REDACTED_LITERAL)));
    }

    #[test]
    fn test_success_and_recovery() {
        let recovery = quick(FailureMode::FailSafe);
        let outcome: RecoveryOutcome<Value> = recovery.execute(|| Ok(json!("x")), &json!("v"), "a");
        assert_eq!(outcome.status, RecoveryStatus::Success);

        let mut calls = 0;
        let outcome: RecoveryOutcome<MaskResult> = recovery.execute(
            || {
                calls += 1;
                if calls < 2 {
                    Err(transient())
                } else {
                    Ok(MaskResult::Remove)
                }
            },
            &json!("v"),
            "a",
        );
        assert_eq!(outcome.status, RecoveryStatus::Recovered);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.value, Some(MaskResult::Remove));
    }

    #[test]
    fn test_panics_are_contained_and_without_fallback_fails() {
        let recovery = quick(FailureMode::FailSafe).without_fallback();
        let outcome: RecoveryOutcome<Value> =
            recovery.execute(|| -> Result<Value, MaskingError> { panic!("strategy bug") }, &json!(1), "n");
        assert_eq!(outcome.status, RecoveryStatus::Failed);
        let err = outcome.clone().into_result().unwrap_err();
        assert!(err.to_string().contains("strategy bug"));
        let ctx = outcome.to_audit_context();
        assert_eq!(ctx["status"], json!("FAILED"));
        assert_eq!(ctx["attempts"], json!(3));
    }

    #[test]
    fn test_fallback_shapes() {
        let safe = FailureMode::FailSafe;
        assert_eq!(safe.fallback_for(&json!(7)), json!("[INT]"));
        assert_eq!(safe.fallback_for(&json!(1.5)), json!("[FLOAT]"));
        assert_eq!(safe.fallback_for(&json!(true)), json!("[BOOL]"));
        assert_eq!(safe.fallback_for(&Value::Null), json!("[NULL]"));
        assert_eq!(safe.fallback_for(&json!([1, 2])), json!("[ARRAY:2 items]"));
        assert_eq!(safe.fallback_for(&json!({"a": 1})), json!("[OBJECT:1 keys]"));
        assert_eq!(FailureMode::FailOpen.fallback_for(&json!("raw")), json!("raw"));
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let recovery = RecoveryStrategy::default();
        assert_eq!(recovery.backoff_delay(1), Duration::from_millis(10));
        assert_eq!(recovery.backoff_delay(2), Duration::from_millis(20));
        assert_eq!(recovery.backoff_delay(3), Duration::from_millis(40));
        assert_eq!(recovery.backoff_delay(5), Duration::from_millis(100));
    }
}
