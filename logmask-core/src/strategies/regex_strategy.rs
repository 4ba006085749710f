// logmask-core/src/strategies/regex_strategy.rs
//! A `MaskingStrategy` that substitutes regex matches in the string form of
//! scalar values.
//! License: MIT OR APACHE 2.0

use serde_json::Value;

use super::{path_admitted, REGEX_PRIORITY};
use crate::coercion::stringify;
use crate::errors::MaskingError;
use crate::patterns::{PatternSet, PatternValidator};
use crate::path;
use crate::record::{MaskResult, RecordContext};
use crate::strategy::MaskingStrategy;

#[derive(Debug, Clone)]
pub struct RegexMaskingStrategy {
    name: String,
    priority: i32,
    patterns: PatternSet,
    include_paths: Vec<String>,
    exclude_paths: Vec<String>,
}

impl RegexMaskingStrategy {
    /// Compiles `(pattern, replacement)` pairs through `validator`. Any
    /// invalid or risky pattern fails construction.
    pub fn new<I, K, V>(validator: &PatternValidator, pairs: I) -> Result<Self, MaskingError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Ok(Self::from_pattern_set(PatternSet::compile(validator, pairs)?))
    }

    pub fn from_pattern_set(patterns: PatternSet) -> Self {
        Self {
            name: "regex".to_string(),
            priority: REGEX_PRIORITY,
            patterns,
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restricts the strategy to paths matching at least one of `paths`.
    pub fn with_include_paths(mut self, paths: Vec<String>) -> Result<Self, MaskingError> {
        paths.iter().try_for_each(|p| path::validate(p))?;
        self.include_paths = paths;
        Ok(self)
    }

    /// Never applies to paths matching any of `paths`.
    pub fn with_exclude_paths(mut self, paths: Vec<String>) -> Result<Self, MaskingError> {
        paths.iter().try_for_each(|p| path::validate(p))?;
        self.exclude_paths = paths;
        Ok(self)
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }
}

impl MaskingStrategy for RegexMaskingStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn should_apply(&self, value: &Value, path: &str, _record: &RecordContext) -> bool {
        if self.patterns.is_empty() || !path_admitted(&self.include_paths, &self.exclude_paths, path) {
            return false;
        }
        stringify(value).is_some_and(|text| self.patterns.is_match(&text))
    }

    fn apply(&self, value: &Value, _path: &str, _record: &RecordContext) -> Result<MaskResult, MaskingError> {
        let Some(text) = stringify(value) else {
            return Ok(MaskResult::Value(value.clone()));
        };
        let masked = self.patterns.apply(&text).into_owned();
        Ok(MaskResult::Value(Value::String(masked)))
    }
}
