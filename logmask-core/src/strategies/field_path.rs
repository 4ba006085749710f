// logmask-core/src/strategies/field_path.rs
//! A `MaskingStrategy` driven by dot-notation field rules. Exact paths take
//! priority over wildcard paths; among wildcards the most specific wins.
//! License: MIT OR APACHE 2.0

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::FIELD_PATH_PRIORITY;
use crate::coercion::{preserve_type, stringify};
use crate::config::{FieldRule, MaskAction};
use crate::errors::MaskingError;
use crate::patterns::{PatternSet, PatternValidator};
use crate::path;
use crate::record::{MaskResult, RecordContext};
use crate::strategy::MaskingStrategy;

#[derive(Debug, Clone)]
enum CompiledFieldRule {
    Literal(String),
    Remove,
    Regex(PatternSet),
}

impl CompiledFieldRule {
    fn compile(rule: &FieldRule, validator: &PatternValidator) -> Result<Self, MaskingError> {
        Ok(match rule {
            FieldRule::Literal(value) => Self::Literal(value.clone()),
            FieldRule::Rule(rule) => match rule.action() {
                MaskAction::Remove => Self::Remove,
                MaskAction::Replace { value } => Self::Literal(value.clone()),
                MaskAction::RegexMask { pattern, replacement } => {
                    Self::Regex(PatternSet::compile(validator, [(pattern, replacement.clone())])?)
                }
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct FieldPathMaskingStrategy {
    priority: i32,
    exact: HashMap<String, CompiledFieldRule>,
    wildcards: Vec<(String, CompiledFieldRule)>,
}

impl FieldPathMaskingStrategy {
    pub fn new(validator: &PatternValidator, rules: &BTreeMap<String, FieldRule>) -> Result<Self, MaskingError> {
        let mut exact = HashMap::new();
        let mut wildcards = Vec::new();
        for (field_path, rule) in rules {
            path::validate(field_path)?;
            let compiled = CompiledFieldRule::compile(rule, validator)?;
            if path::is_wildcard(field_path) {
                wildcards.push((field_path.clone(), compiled));
            } else {
                exact.insert(field_path.clone(), compiled);
            }
        }
        // Stable: equally specific wildcards keep their key order.
        wildcards.sort_by(|a, b| path::specificity(&b.0).cmp(&path::specificity(&a.0)));
        Ok(Self {
            priority: FIELD_PATH_PRIORITY,
            exact,
            wildcards,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.wildcards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rule_for(&self, field_path: &str) -> Option<&CompiledFieldRule> {
        self.exact.get(field_path).or_else(|| {
            self.wildcards
                .iter()
                .find(|(pattern, _)| path::wildcard_match(pattern, field_path))
                .map(|(_, rule)| rule)
        })
    }
}

impl MaskingStrategy for FieldPathMaskingStrategy {
    fn name(&self) -> &str {
        "field_path"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn should_apply(&self, _value: &Value, path: &str, _record: &RecordContext) -> bool {
        self.rule_for(path).is_some()
    }

    /// Exact `REMOVE` and literal rules replace a map or array as a whole.
    /// Regex rules only see scalars, so their containers are traversed.
    fn masks_container(&self, path: &str) -> bool {
        matches!(
            self.exact.get(path),
            Some(CompiledFieldRule::Remove | CompiledFieldRule::Literal(_))
        )
    }

    fn apply(&self, value: &Value, path: &str, _record: &RecordContext) -> Result<MaskResult, MaskingError> {
        let Some(rule) = self.rule_for(path) else {
            return Ok(MaskResult::Value(value.clone()));
        };
        Ok(match rule {
            CompiledFieldRule::Remove => MaskResult::Remove,
            CompiledFieldRule::Literal(literal) => {
                MaskResult::Value(preserve_type(value, Value::String(literal.clone())))
            }
            CompiledFieldRule::Regex(patterns) => match stringify(value) {
                Some(text) => {
                    let masked = Value::String(patterns.apply(&text).into_owned());
                    MaskResult::Value(preserve_type(value, masked))
                }
                None => MaskResult::Value(value.clone()),
            },
        })
    }
}
