// logmask-core/src/strategy.rs
//! Defines the core `MaskingStrategy` trait.
//!
//! A strategy is a named, prioritized, side-effect-free policy deciding
//! whether and how one value is masked. Scalars are offered to every
//! strategy; maps and arrays only to strategies that address them by path. The
//! [`crate::manager::StrategyManager`] dispatches each value to the single
//! highest-priority strategy that applies.
//!
//! License: MIT OR APACHE 2.0

use serde::Serialize;
use serde_json::Value;

use crate::coercion;
use crate::errors::MaskingError;
use crate::record::{MaskResult, RecordContext};

/// A pluggable masking policy.
///
/// Implementations must be immutable after construction: the same
/// `(value, path, record)` always yields the same answer.
pub trait MaskingStrategy: Send + Sync {
    /// A name used in logs, audit records and [`crate::manager::StrategyManager::remove_strategy`].
    fn name(&self) -> &str;

    /// Higher wins.
    fn priority(&self) -> i32;

    /// Returns `true` if this strategy wants to mask `value` at `path`.
    fn should_apply(&self, value: &Value, path: &str, record: &RecordContext) -> bool;

    /// Returns `true` if this strategy addresses the map or array at `path`
    /// as a whole. Such a container is masked in place of being traversed.
    /// Strategies that only understand scalars keep the default.
    fn masks_container(&self, _path: &str) -> bool {
        false
    }

    /// Masks `value`. Only called after `should_apply` returned `true`.
    fn apply(&self, value: &Value, path: &str, record: &RecordContext) -> Result<MaskResult, MaskingError>;

    /// Converts a string result back into the type family of `original`.
    ///
    /// The default converts numeric, boolean and null literals; strategies
    /// whose output type is deliberate override this to return `masked` as is.
    fn preserve_type(&self, original: &Value, masked: Value) -> Value {
        coercion::preserve_type(original, masked)
    }
}

/// Name and priority of a registered strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategySummary {
    pub name: String,
    pub priority: i32,
}

impl StrategySummary {
    pub fn of(strategy: &dyn MaskingStrategy) -> Self {
        Self {
            name: strategy.name().to_string(),
            priority: strategy.priority(),
        }
    }
}
