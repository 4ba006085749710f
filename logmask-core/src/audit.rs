// logmask-core/src/audit.rs
//! Audit events describing masking decisions, and a rate-limited dispatcher
//! that forwards them to a host-supplied sink.
//!
//! Events carry previews, never raw values: strings are capped at
//! [`crate::preview::MAX_PREVIEW_CHARS`] and containers are reduced to a
//! type tag with their size. Sink failures are contained here and never
//! affect the masked output.
//!
//! License: MIT OR APACHE 2.0

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{panic_message, MaskingError};
use crate::limiter::{RateLimitConfig, RateLimiter};
use crate::preview::{audit_preview, fingerprint};

/// Receives `(path, original_preview, masked_preview)` for every admitted event.
pub type AuditSink = Arc<dyn Fn(&str, &Value, &Value) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Masked,
    Removed,
    MaxDepthReached,
    RecoveryFallback,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Masked => "masked",
            Self::Removed => "removed",
            Self::MaxDepthReached => "max_depth_reached",
            Self::RecoveryFallback => "recovery_fallback",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One masking decision, safe to hand to an audit channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub path: String,
    pub kind: AuditKind,
    #[serde(default)]
    pub strategy: Option<String>,
    pub original_preview: Value,
    pub masked_preview: Value,
    /// SHA-256 of the path and the original value, for correlation.
    pub fingerprint: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: Option<Value>,
}

impl AuditEvent {
    fn build(path: &str, kind: AuditKind, strategy: Option<&str>, original: &Value, masked: Value) -> Self {
        Self {
            path: path.to_string(),
            kind,
            strategy: strategy.map(str::to_string),
            original_preview: audit_preview(original),
            masked_preview: masked,
            fingerprint: fingerprint(path, original),
            timestamp: Utc::now(),
            details: None,
        }
    }

    pub fn masked(path: &str, strategy: &str, original: &Value, masked: &Value) -> Self {
        Self::build(path, AuditKind::Masked, Some(strategy), original, audit_preview(masked))
    }

    pub fn removed(path: &str, strategy: &str, original: &Value) -> Self {
        Self::build(path, AuditKind::Removed, Some(strategy), original, Value::Null)
    }

    pub fn max_depth_reached(path: &str, depth: usize, subtree: &Value) -> Self {
        let mut event = Self::build(path, AuditKind::MaxDepthReached, None, subtree, audit_preview(subtree));
        event.details = Some(serde_json::json!({ "depth": depth }));
        event
    }

    /// `details` is typically [`crate::recovery::RecoveryOutcome::to_audit_context`].
    pub fn recovery_fallback(path: &str, original: &Value, fallback: &Value, details: Value) -> Self {
        let mut event = Self::build(path, AuditKind::RecoveryFallback, None, original, audit_preview(fallback));
        event.details = Some(details);
        event
    }
}

/// Counters kept by [`RateLimitedAuditLogger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub emitted: u64,
    pub suppressed: u64,
    pub failed: u64,
}

/// Forwards audit events to a sink, admitting at most the configured rate
/// per [`AuditKind`].
pub struct RateLimitedAuditLogger {
    sink: Option<AuditSink>,
    limiter: Option<RateLimiter>,
    emitted: AtomicU64,
    suppressed: AtomicU64,
    failed: AtomicU64,
}

impl fmt::Debug for RateLimitedAuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedAuditLogger")
            .field("has_sink", &self.sink.is_some())
            .field("limiter", &self.limiter.as_ref().map(RateLimiter::config))
            .field("stats", &self.stats())
            .finish()
    }
}

impl RateLimitedAuditLogger {
    /// Without `limits` every event reaches the sink.
    pub fn new(sink: Option<AuditSink>, limits: Option<RateLimitConfig>) -> Result<Self, MaskingError> {
        let limiter = limits.map(RateLimiter::new).transpose()?;
        Ok(Self {
            sink,
            limiter,
            emitted: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    /// A logger that drops every event.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            limiter: None,
            emitted: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    /// Delivers `event` unless the rate limit for its kind is exhausted.
    /// Returns whether the sink accepted it.
    pub fn log(&self, event: &AuditEvent) -> bool {
        let Some(sink) = &self.sink else {
            return false;
        };
        if !self.admit(event) {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            trace!("Audit event for '{}' suppressed by rate limit.", event.path);
            return false;
        }
        match deliver(sink, event) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!("{}", e);
                false
            }
        }
    }

    pub fn log_all(&self, events: &[AuditEvent]) {
        for event in events {
            self.log(event);
        }
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            emitted: self.emitted.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn admit(&self, event: &AuditEvent) -> bool {
        let Some(limiter) = &self.limiter else {
            return true;
        };
        let key = format!("audit:{}", event.kind);
        match limiter.is_allowed(&key) {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!("Audit rate limiter rejected key '{}': {}", key, e);
                false
            }
        }
    }
}

fn deliver(sink: &AuditSink, event: &AuditEvent) -> Result<(), MaskingError> {
    match catch_unwind(AssertUnwindSafe(|| sink(&event.path, &event.original_preview, &event.masked_preview))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(MaskingError::AuditLogging(format!("sink failed for '{}': {:#}", event.path, e))),
        Err(payload) => Err(MaskingError::AuditLogging(format!(
            "sink panicked for '{}': {}",
            event.path,
            panic_message(payload)
        ))),
    }
}
