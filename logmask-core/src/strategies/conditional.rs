// logmask-core/src/strategies/conditional.rs
//! A `MaskingStrategy` that wraps another strategy behind a set of named
//! record-level predicates.
//!
//! Predicates are combined with AND ([`Conjunction::All`]) or OR
//! ([`Conjunction::Any`]). A predicate that errors or panics counts as not
//! satisfied under AND and is ignored under OR.
//! License: MIT OR APACHE 2.0

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::warn;
use serde_json::Value;

use crate::errors::{panic_message, MaskingError};
use crate::record::{MaskResult, RecordContext};
use crate::strategy::MaskingStrategy;

/// A named predicate over the record.
pub type Condition = Arc<dyn Fn(&RecordContext) -> anyhow::Result<bool> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Conjunction {
    #[default]
    All,
    Any,
}

/// Named predicates combined under one [`Conjunction`].
#[derive(Clone, Default)]
pub struct ConditionSet {
    conditions: Vec<(String, Condition)>,
    conjunction: Conjunction,
}

impl std::fmt::Debug for ConditionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionSet")
            .field("conditions", &self.names())
            .field("conjunction", &self.conjunction)
            .finish()
    }
}

impl ConditionSet {
    pub fn new(conjunction: Conjunction) -> Self {
        Self {
            conditions: Vec::new(),
            conjunction,
        }
    }

    pub fn push(&mut self, name: impl Into<String>, condition: Condition) {
        self.conditions.push((name.into(), condition));
    }

    pub fn set_conjunction(&mut self, conjunction: Conjunction) {
        self.conjunction = conjunction;
    }

    pub fn conjunction(&self) -> Conjunction {
        self.conjunction
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.conditions.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Evaluates the set against `record`. An empty set is satisfied.
    pub fn is_satisfied(&self, record: &RecordContext) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        let mut any_satisfied = false;
        for (name, condition) in &self.conditions {
            match evaluate(condition, record) {
                Ok(true) => {
                    if self.conjunction == Conjunction::Any {
                        return true;
                    }
                    any_satisfied = true;
                }
                Ok(false) => {
                    if self.conjunction == Conjunction::All {
                        return false;
                    }
                }
                Err(reason) => {
                    warn!("Masking condition '{}' failed: {}", name, reason);
                    if self.conjunction == Conjunction::All {
                        return false;
                    }
                }
            }
        }
        match self.conjunction {
            Conjunction::All => true,
            Conjunction::Any => any_satisfied,
        }
    }
}

fn evaluate(condition: &Condition, record: &RecordContext) -> Result<bool, String> {
    match catch_unwind(AssertUnwindSafe(|| condition(record))) {
        Ok(Ok(satisfied)) => Ok(satisfied),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload)),
    }
}

pub struct ConditionalMaskingStrategy {
    name: String,
    inner: Arc<dyn MaskingStrategy>,
    conditions: ConditionSet,
    priority: Option<i32>,
}

impl std::fmt::Debug for ConditionalMaskingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionalMaskingStrategy")
            .field("name", &self.name)
            .field("inner", &self.inner.name())
            .field("conditions", &self.conditions)
            .field("priority", &self.priority())
            .finish()
    }
}

impl ConditionalMaskingStrategy {
    /// Wraps `inner`. With no conditions added the wrapper always delegates.
    pub fn new(inner: Arc<dyn MaskingStrategy>) -> Self {
        Self {
            name: format!("conditional({})", inner.name()),
            inner,
            conditions: ConditionSet::default(),
            priority: None,
        }
    }

    /// Wraps `inner` behind an existing set of conditions.
    pub fn with_condition_set(inner: Arc<dyn MaskingStrategy>, conditions: ConditionSet) -> Self {
        Self {
            conditions,
            ..Self::new(inner)
        }
    }

    pub fn with_condition(mut self, name: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push(name, condition);
        self
    }

    pub fn with_conjunction(mut self, conjunction: Conjunction) -> Self {
        self.conditions.set_conjunction(conjunction);
        self
    }

    /// Overrides the priority, which otherwise follows the wrapped strategy.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn conditions_met(&self, record: &RecordContext) -> bool {
        self.conditions.is_satisfied(record)
    }
}

impl MaskingStrategy for ConditionalMaskingStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority.unwrap_or_else(|| self.inner.priority())
    }

    fn should_apply(&self, value: &Value, path: &str, record: &RecordContext) -> bool {
        self.conditions_met(record) && self.inner.should_apply(value, path, record)
    }

    fn masks_container(&self, path: &str) -> bool {
        self.inner.masks_container(path)
    }

    fn apply(&self, value: &Value, path: &str, record: &RecordContext) -> Result<MaskResult, MaskingError> {
        self.inner.apply(value, path, record)
    }

    fn preserve_type(&self, original: &Value, masked: Value) -> Value {
        self.inner.preserve_type(original, masked)
    }
}
