//! errors.rs - Custom error types for the logmask-core library.
//!
//! This module defines a structured error enum for the library, providing
//! specific, actionable error types that can be handled programmatically.
//! Configuration-time errors are surfaced from constructors; runtime masking
//! errors are routed through [`crate::recovery::RecoveryStrategy`].
//!
//! License: MIT OR APACHE 2.0

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a pattern was rejected by the [`crate::patterns::PatternValidator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternErrorKind {
    /// The pattern text is empty.
    Empty,
    /// The pattern exceeds `MAX_PATTERN_LENGTH`.
    TooLong,
    /// The regex engine refused to compile the pattern.
    Compile,
    /// A quantified group contains an unbounded quantifier, e.g. `(a+)+`.
    NestedQuantifier,
    /// A group with an unbounded quantifier under a bounded repetition, e.g. `(x+){2,5}`.
    QuantifiedRepetition,
    /// Structurally identical alternatives under a quantifier, e.g. `(a|a)*`.
    RepeatedAlternation,
}

impl PatternErrorKind {
    /// Whether the rejection came from the backtracking-risk heuristics.
    pub fn is_redos(&self) -> bool {
        matches!(
            self,
            Self::NestedQuantifier | Self::QuantifiedRepetition | Self::RepeatedAlternation
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooLong => "too_long",
            Self::Compile => "compile",
            Self::NestedQuantifier => "redos_nested_quantifier",
            Self::QuantifiedRepetition => "redos_quantified_repetition",
            Self::RepeatedAlternation => "redos_repeated_alternation",
        }
    }
}

impl fmt::Display for PatternErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// This enum represents all possible error types in the `logmask-core` library.
///
/// By using `#[non_exhaustive]`, we signal to consumers of this library that
/// new variants may be added in future versions.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum MaskingError {
    #[error("Invalid pattern '{pattern}' ({kind}): {message}")]
    InvalidPattern {
        pattern: String,
        kind: PatternErrorKind,
        message: String,
    },

    #[error("Invalid masking configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Masking operation '{operation}' failed at '{path}' (value: {preview}): {reason}")]
    MaskingOperationFailed {
        operation: String,
        path: String,
        preview: String,
        reason: String,
    },

    #[error("Recursion depth {depth} exceeded maximum of {max_depth} at '{path}'")]
    RecursionDepthExceeded {
        path: String,
        depth: usize,
        max_depth: usize,
    },

    #[error("Rate limit exceeded for key '{key}', retry after {retry_after:?}")]
    RateLimitExceeded { key: String, retry_after: Duration },

    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimitConfig(String),

    #[error("Audit logging failed: {0}")]
    AuditLogging(String),

    #[error("Failed to (de)serialize masking configuration: {0}")]
    Serialization(String),
}

impl MaskingError {
    /// Builds an `InvalidPattern` error.
    pub fn invalid_pattern(pattern: &str, kind: PatternErrorKind, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            kind,
            message: message.into(),
        }
    }

    /// Builds a `MaskingOperationFailed` error. The preview must already be redacted.
    pub fn operation_failed(
        operation: &str,
        path: &str,
        preview: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self::MaskingOperationFailed {
            operation: operation.to_string(),
            path: path.to_string(),
            preview: preview.into(),
            reason: reason.to_string(),
        }
    }

    /// Configuration-class failures are deterministic and never retried.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidPattern { .. }
                | Self::InvalidConfiguration(_)
                | Self::InvalidRateLimitConfig(_)
                | Self::RecursionDepthExceeded { .. }
        )
    }

    /// A short machine-readable tag used in audit records.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::MaskingOperationFailed { .. } => "masking_operation_failed",
            Self::RecursionDepthExceeded { .. } => "recursion_depth_exceeded",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::InvalidRateLimitConfig(_) => "invalid_rate_limit_config",
            Self::AuditLogging(_) => "audit_logging",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for MaskingError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yml::Error> for MaskingError {
    fn from(e: serde_yml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_not_recoverable() {
        let e = MaskingError::invalid_pattern("(a+)+", PatternErrorKind::NestedQuantifier, "nested");
        assert!(!e.is_recoverable());
        let e = MaskingError::RecursionDepthExceeded { path: "a".into(), depth: 3, max_depth: 2 };
        assert!(!e.is_recoverable());
        assert!(!MaskingError::InvalidConfiguration("x".into()).is_recoverable());
    }

    #[test]
    fn test_runtime_errors_are_recoverable() {
        let e = MaskingError::operation_failed("callback", "user.email", "[STRING:5 chars]", "boom");
        assert!(e.is_recoverable());
        assert!(e.to_string().contains("user.email"));
        assert!(MaskingError::AuditLogging("sink".into()).is_recoverable());
    }

    #[test]
    fn test_redos_kinds() {
        assert!(PatternErrorKind::RepeatedAlternation.is_redos());
        assert!(!PatternErrorKind::Compile.is_redos());
        assert_eq!(PatternErrorKind::TooLong.to_string(), "too_long");
    }
}
