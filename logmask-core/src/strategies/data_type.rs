// logmask-core/src/strategies/data_type.rs
//! A `MaskingStrategy` that replaces values according to their primitive
//! type, converting the literal back into that type where possible.
//! License: MIT OR APACHE 2.0

use std::collections::BTreeMap;

use serde_json::Value;

use super::{path_admitted, DATA_TYPE_PRIORITY};
use crate::coercion::coerce_literal;
use crate::config::DataType;
use crate::errors::MaskingError;
use crate::path;
use crate::record::{MaskResult, RecordContext};
use crate::strategy::MaskingStrategy;

#[derive(Debug, Clone)]
pub struct DataTypeMaskingStrategy {
    priority: i32,
    masks: BTreeMap<DataType, String>,
    include_paths: Vec<String>,
    exclude_paths: Vec<String>,
}

impl DataTypeMaskingStrategy {
    pub fn new(masks: BTreeMap<DataType, String>) -> Self {
        Self {
            priority: DATA_TYPE_PRIORITY,
            masks,
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
        }
    }

    /// Builds from string type names, rejecting names outside [`DataType`].
    pub fn from_type_names(masks: &BTreeMap<String, String>) -> Result<Self, MaskingError> {
        let typed = masks
            .iter()
            .map(|(name, literal)| Ok((name.parse::<DataType>()?, literal.clone())))
            .collect::<Result<BTreeMap<_, _>, MaskingError>>()?;
        Ok(Self::new(typed))
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_include_paths(mut self, paths: Vec<String>) -> Result<Self, MaskingError> {
        paths.iter().try_for_each(|p| path::validate(p))?;
        self.include_paths = paths;
        Ok(self)
    }

    pub fn with_exclude_paths(mut self, paths: Vec<String>) -> Result<Self, MaskingError> {
        paths.iter().try_for_each(|p| path::validate(p))?;
        self.exclude_paths = paths;
        Ok(self)
    }

    fn literal_for(&self, value: &Value) -> Option<&String> {
        DataType::of(value).and_then(|t| self.masks.get(&t))
    }
}

impl MaskingStrategy for DataTypeMaskingStrategy {
    fn name(&self) -> &str {
        "data_type"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn should_apply(&self, value: &Value, path: &str, _record: &RecordContext) -> bool {
        self.literal_for(value).is_some() && path_admitted(&self.include_paths, &self.exclude_paths, path)
    }

    fn apply(&self, value: &Value, _path: &str, _record: &RecordContext) -> Result<MaskResult, MaskingError> {
        Ok(MaskResult::Value(match self.literal_for(value) {
            Some(literal) => coerce_literal(value, literal),
            None => value.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strategy() -> DataTypeMaskingStrategy {
        let mut masks = BTreeMap::new();
        masks.insert("string".to_string(), "***".to_string());
        masks.insert("integer".to_string(), "999".to_string());
        masks.insert("boolean".to_string(), "false".to_string());
        DataTypeMaskingStrategy::from_type_names(&masks).unwrap()
    }

    #[test]
    fn test_integer_stays_integer() {
        let record = RecordContext::default();
        let s = strategy();
        assert!(s.should_apply(&json!(42), "count", &record));
        assert_eq!(s.apply(&json!(42), "count", &record).unwrap(), MaskResult::Value(json!(999)));
        assert_eq!(s.apply(&json!(true), "flag", &record).unwrap(), MaskResult::Value(json!(false)));
        assert_eq!(s.apply(&json!("x"), "name", &record).unwrap(), MaskResult::Value(json!("***")));
    }

    #[test]
    fn test_unconfigured_types_and_excluded_paths() {
        let record = RecordContext::default();
        let s = strategy().with_exclude_paths(vec!["meta.*".into()]).unwrap();
        assert!(!s.should_apply(&json!(1.5), "ratio", &record));
        assert!(!s.should_apply(&Value::Null, "nothing", &record));
        assert!(!s.should_apply(&json!("v1"), "meta.version", &record));
    }

    #[test]
    fn test_unknown_type_name_rejected() {
        let mut masks = BTreeMap::new();
        masks.insert("resource".to_string(), "x".to_string());
        assert!(DataTypeMaskingStrategy::from_type_names(&masks).is_err());
    }
}
