// logmask-core/src/lib.rs
//! # logmask Core Library
//!
//! `logmask-core` masks sensitive data in structured log records. Given a log
//! message and an arbitrarily nested context (`serde_json` maps, arrays and
//! scalars), it returns a copy in which personal or secret values are
//! replaced, removed or transformed, leaving everything else untouched.
//!
//! The library performs no I/O and keeps no state across process restarts.
//! The host logging framework extracts `(message, context)` from its own
//! record type, calls [`MaskingEngine::process`], and writes the result back.
//!
//! ## Modules
//!
//! * `config`: `MaskRule`, `FieldRule` and the serializable `MaskingConfig`.
//! * `patterns`: regex validation with ReDoS heuristics and a shared cache.
//! * `strategy`: the `MaskingStrategy` trait.
//! * `strategies`: regex, field-path, data-type, conditional and callback strategies.
//! * `manager`: priority-ordered, first-match-wins dispatch.
//! * `processor`: depth-bounded traversal of message and context.
//! * `limiter`: sliding-window rate limiting keyed by string.
//! * `audit`: audit events and the rate-limited sink dispatcher.
//! * `recovery`: retry with backoff and type-aware fallback values.
//! * `engine`: the orchestrator and its builder.
//! * `headless`: one-shot masking.
//!
//! ## Usage Example
//!
//! ```rust
//! use logmask_core::{FieldRule, MaskingConfig, MaskingEngine, RecordContext};
//! use serde_json::json;
//!
//! fn main() -> Result<(), logmask_core::MaskingError> {
//!     let config = MaskingConfig::default()
//!         .with_pattern(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}", "[email]")
//!         .with_field_rule("user.ssn", FieldRule::remove());
//!     let engine = MaskingEngine::from_config(config)?;
//!
//!     let context = json!({"user": {"ssn": "123-45-6789", "name": "Ada"}});
//!     let masked = engine.process(
//!         "Signup by ada@example.com",
//!         context.as_object().unwrap(),
//!         &RecordContext::default(),
//!     )?;
//!
//!     assert_eq!(masked.message, "Signup by [email]");
//!     assert_eq!(masked.context["user"], json!({"name": "Ada"}));
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`MaskingError`]. Configuration problems
//! surface when the engine is built; runtime masking failures are retried and
//! resolved by the configured [`FailureMode`], so a built engine never
//! panics or leaks a value because one field failed to mask.
//!
//! ---
//! License: MIT OR APACHE 2.0

pub mod audit;
pub mod coercion;
pub mod config;
pub mod engine;
pub mod errors;
pub mod headless;
pub mod limiter;
pub mod manager;
pub mod path;
pub mod patterns;
pub mod preview;
pub mod processor;
pub mod record;
pub mod recovery;
pub mod strategies;
pub mod strategy;

/// Re-exports the configuration types.
pub use config::{
    DataType, DefaultPattern, DepthPolicy, FieldRule, MaskAction, MaskRule, MaskingConfig, RetryConfig,
    DEFAULT_MAX_DEPTH, MAX_DEPTH_LIMIT,
};

/// Re-exports the error taxonomy.
pub use errors::{MaskingError, PatternErrorKind};

pub use patterns::{PatternCache, PatternSet, PatternValidator, MAX_PATTERN_LENGTH};

/// Re-exports the strategy trait and its implementations.
pub use strategy::{MaskingStrategy, StrategySummary};
pub use strategies::{
    conditions, CallbackMaskingStrategy, CallbackStrategyBuilder, Condition, ConditionSet,
    ConditionalMaskingStrategy, Conjunction, DataTypeMaskingStrategy, FieldPathMaskingStrategy, MaskCallback,
    RegexMaskingStrategy,
};

pub use manager::StrategyManager;
pub use processor::{ProcessedRecord, RecursiveProcessor, TraversalState};
pub use record::{LogLevel, MaskResult, RecordContext};

pub use limiter::{RateLimitConfig, RateLimiter};
pub use audit::{AuditEvent, AuditKind, AuditSink, AuditStats, RateLimitedAuditLogger};
pub use recovery::{FailureMode, RecoveryOutcome, RecoveryStatus, RecoveryStrategy};

pub use engine::{MaskedRecord, MaskingEngine, MaskingEngineBuilder};
pub use headless::headless_mask;
