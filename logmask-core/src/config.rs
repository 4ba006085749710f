//! Configuration management for `logmask-core`.
//!
//! This module defines the masking rule types and the serializable engine
//! configuration. Configuration text (YAML or JSON) is parsed and validated
//! here; reading it from disk or the environment is left to the host.
//! Non-serializable parts of a configuration (callbacks, conditions, audit
//! sinks) are attached through [`crate::engine::MaskingEngineBuilder`].
//!
//! License: MIT OR Apache-2.0

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::MaskingError;
use crate::limiter::RateLimitConfig;
use crate::path;
use crate::patterns::PatternValidator;
use crate::recovery::FailureMode;

/// Default traversal depth limit.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Largest `max_depth` a configuration may request.
pub const MAX_DEPTH_LIMIT: usize = 1000;

/// Upper bound for `retry.max_attempts`.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// The action a [`MaskRule`] performs. Serialized with a `kind` tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaskAction {
    RegexMask { pattern: String, replacement: String },
    Remove,
    Replace { value: String },
}

/// A validated masking rule. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MaskAction", into = "MaskAction")]
pub struct MaskRule {
    action: MaskAction,
}

impl MaskRule {
    /// A regex substitution. The pattern must compile and pass the ReDoS
    /// heuristics.
    pub fn regex(pattern: impl Into<String>, replacement: impl Into<String>) -> Result<Self, MaskingError> {
        Self::try_from(MaskAction::RegexMask {
            pattern: pattern.into(),
            replacement: replacement.into(),
        })
    }

    pub fn remove() -> Self {
        Self { action: MaskAction::Remove }
    }

    /// A literal substitution. The value must be non-empty.
    pub fn replace(value: impl Into<String>) -> Result<Self, MaskingError> {
        Self::try_from(MaskAction::Replace { value: value.into() })
    }

    pub fn action(&self) -> &MaskAction {
        &self.action
    }

    fn check(action: &MaskAction, validator: &PatternValidator) -> Result<(), MaskingError> {
        match action {
            MaskAction::RegexMask { pattern, .. } => validator.validate(pattern),
            MaskAction::Remove => Ok(()),
            MaskAction::Replace { value } if value.is_empty() => Err(MaskingError::InvalidConfiguration(
                "REPLACE rule requires a non-empty value".to_string(),
            )),
            MaskAction::Replace { .. } => Ok(()),
        }
    }
}

impl TryFrom<MaskAction> for MaskRule {
    type Error = MaskingError;

    fn try_from(action: MaskAction) -> Result<Self, Self::Error> {
        Self::check(&action, &PatternValidator::new())?;
        Ok(Self { action })
    }
}

impl From<MaskRule> for MaskAction {
    fn from(rule: MaskRule) -> Self {
        rule.action
    }
}

/// What to do with a value addressed by a field path: a literal string
/// replacement or a full [`MaskRule`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum FieldRule {
    Literal(String),
    Rule(MaskRule),
}

/// Shape of a field rule before its pattern is checked.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawFieldRule {
    Literal(String),
    Rule(MaskAction),
}

impl<'de> Deserialize<'de> for FieldRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawFieldRule::deserialize(deserializer)? {
            RawFieldRule::Literal(value) => Ok(Self::Literal(value)),
            RawFieldRule::Rule(action) => MaskRule::try_from(action).map(Self::Rule).map_err(de::Error::custom),
        }
    }
}

/// Reads `field_rules` without checking patterns. [`MaskingConfig::validate`]
/// checks them afterwards and reports the typed [`MaskingError::InvalidPattern`].
fn deserialize_unchecked_rules<'de, D>(deserializer: D) -> Result<BTreeMap<String, FieldRule>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, RawFieldRule>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(field_path, rule)| {
            let rule = match rule {
                RawFieldRule::Literal(value) => FieldRule::Literal(value),
                RawFieldRule::Rule(action) => FieldRule::Rule(MaskRule { action }),
            };
            (field_path, rule)
        })
        .collect())
}

impl FieldRule {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn remove() -> Self {
        Self::Rule(MaskRule::remove())
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Rule(rule) if matches!(rule.action(), MaskAction::Remove))
    }
}

impl From<MaskRule> for FieldRule {
    fn from(rule: MaskRule) -> Self {
        Self::Rule(rule)
    }
}

/// Primitive type names accepted as data-type mask keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Integer,
    Double,
    Boolean,
    Null,
}

impl DataType {
    /// The data type of a primitive value; containers have none.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(Self::String),
            Value::Number(n) if n.is_f64() => Some(Self::Double),
            Value::Number(_) => Some(Self::Integer),
            Value::Bool(_) => Some(Self::Boolean),
            Value::Null => Some(Self::Null),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = MaskingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "integer" | "int" => Ok(Self::Integer),
            "double" | "float" => Ok(Self::Double),
            "boolean" | "bool" => Ok(Self::Boolean),
            "null" => Ok(Self::Null),
            other => Err(MaskingError::InvalidConfiguration(format!(
                "unsupported data type '{}' (expected one of string, integer, double, boolean, null)",
                other
            ))),
        }
    }
}

/// What the traversal does when it reaches `max_depth`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthPolicy {
    /// Return the subtree unmodified and emit a `max_depth_reached` audit event.
    #[default]
    Truncate,
    /// Abort the call with `RecursionDepthExceeded`.
    Error,
}

/// Retry settings for the recovery layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), MaskingError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(MaskingError::InvalidConfiguration(format!(
                "retry.max_attempts must be between 1 and {}, got {}",
                MAX_RETRY_ATTEMPTS, self.max_attempts
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(MaskingError::InvalidConfiguration(format!(
                "retry.base_delay_ms ({}) cannot exceed retry.max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// A built-in pattern from the embedded default set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DefaultPattern {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub pattern: String,
    pub replace_with: String,
}

#[derive(Debug, Deserialize)]
struct DefaultPatternFile {
    patterns: Vec<DefaultPattern>,
}

/// The serializable engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingConfig {
    /// Regex -> replacement, applied in declaration order.
    #[serde(with = "ordered_pairs")]
    pub patterns: Vec<(String, String)>,
    /// Dot path (may contain `*`) -> rule.
    #[serde(deserialize_with = "deserialize_unchecked_rules")]
    pub field_rules: BTreeMap<String, FieldRule>,
    /// Primitive type name -> replacement literal.
    pub data_type_masks: BTreeMap<String, String>,
    pub max_depth: usize,
    pub on_max_depth: DepthPolicy,
    pub failure_mode: FailureMode,
    pub retry: RetryConfig,
    pub audit_rate_limit: Option<RateLimitConfig>,
    pub regex_include_paths: Vec<String>,
    pub regex_exclude_paths: Vec<String>,
    pub data_type_exclude_paths: Vec<String>,
    pub use_default_patterns: bool,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            field_rules: BTreeMap::new(),
            data_type_masks: BTreeMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            on_max_depth: DepthPolicy::default(),
            failure_mode: FailureMode::default(),
            retry: RetryConfig::default(),
            audit_rate_limit: Some(RateLimitConfig::default()),
            regex_include_paths: Vec::new(),
            regex_exclude_paths: Vec::new(),
            data_type_exclude_paths: Vec::new(),
            use_default_patterns: false,
        }
    }
}

impl MaskingConfig {
    /// Parses and validates a YAML configuration.
    pub fn from_yaml_str(text: &str) -> Result<Self, MaskingError> {
        let config: MaskingConfig = serde_yml::from_str(text)?;
        config.validate(&PatternValidator::new())?;
        debug!(
            "Loaded masking config: {} patterns, {} field rules, {} data-type masks.",
            config.patterns.len(),
            config.field_rules.len(),
            config.data_type_masks.len()
        );
        Ok(config)
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(text: &str) -> Result<Self, MaskingError> {
        let config: MaskingConfig = serde_json::from_str(text)?;
        config.validate(&PatternValidator::new())?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, MaskingError> {
        Ok(serde_yml::to_string(self)?)
    }

    /// Loads the built-in pattern set from the embedded YAML file.
    pub fn load_default_patterns() -> Result<Vec<DefaultPattern>, MaskingError> {
        debug!("Loading default patterns from embedded string...");
        let default_yaml = include_str!("../config/default_patterns.yaml");
        let file: DefaultPatternFile = serde_yml::from_str(default_yaml)?;
        debug!("Loaded {} default patterns.", file.patterns.len());
        Ok(file.patterns)
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.patterns.push((pattern.into(), replacement.into()));
        self
    }

    pub fn with_field_rule(mut self, path: impl Into<String>, rule: impl Into<FieldRule>) -> Self {
        self.field_rules.insert(path.into(), rule.into());
        self
    }

    pub fn with_data_type_mask(mut self, data_type: DataType, literal: impl Into<String>) -> Self {
        self.data_type_masks.insert(data_type.as_str().to_string(), literal.into());
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// The patterns the engine will apply: defaults first (when enabled),
    /// then user patterns. A user pattern identical to a default one
    /// replaces its replacement in place.
    pub fn effective_patterns(&self) -> Result<Vec<(String, String)>, MaskingError> {
        if !self.use_default_patterns {
            return Ok(self.patterns.clone());
        }
        let mut merged: Vec<(String, String)> = Self::load_default_patterns()?
            .into_iter()
            .map(|p| (p.pattern, p.replace_with))
            .collect();
        for (pattern, replacement) in &self.patterns {
            match merged.iter_mut().find(|entry| &entry.0 == pattern) {
                Some(entry) => {
                    debug!("Overriding default pattern '{}' with user replacement.", pattern);
                    entry.1 = replacement.clone();
                }
                None => merged.push((pattern.clone(), replacement.clone())),
            }
        }
        Ok(merged)
    }

    /// Parsed data-type masks. Fails on unknown type names.
    pub fn typed_data_type_masks(&self) -> Result<BTreeMap<DataType, String>, MaskingError> {
        self.data_type_masks
            .iter()
            .map(|(name, literal)| Ok((name.parse::<DataType>()?, literal.clone())))
            .collect()
    }

    /// Enforces every construction-time constraint.
    pub fn validate(&self, validator: &PatternValidator) -> Result<(), MaskingError> {
        if self.max_depth == 0 || self.max_depth > MAX_DEPTH_LIMIT {
            return Err(MaskingError::InvalidConfiguration(format!(
                "max_depth must be between 1 and {}, got {}",
                MAX_DEPTH_LIMIT, self.max_depth
            )));
        }

        for (pattern, _) in &self.patterns {
            if pattern.trim().is_empty() {
                return Err(MaskingError::InvalidConfiguration("pattern keys cannot be empty".to_string()));
            }
            validator.validate(pattern)?;
        }

        for (field_path, rule) in &self.field_rules {
            path::validate(field_path)?;
            if let FieldRule::Rule(rule) = rule {
                MaskRule::check(rule.action(), validator)?;
            }
        }

        let masks = self.typed_data_type_masks()?;
        if masks.len() != self.data_type_masks.len() {
            return Err(MaskingError::InvalidConfiguration(
                "data_type_masks contains duplicate type names".to_string(),
            ));
        }

        for filter in self
            .regex_include_paths
            .iter()
            .chain(&self.regex_exclude_paths)
            .chain(&self.data_type_exclude_paths)
        {
            path::validate(filter)?;
        }

        self.retry.validate()?;
        if let Some(limits) = &self.audit_rate_limit {
            limits.validate()?;
        }

        if self.failure_mode == FailureMode::FailOpen {
            warn!("failure_mode is fail_open: masking failures will pass original values through.");
        }
        Ok(())
    }
}

/// Serializes `Vec<(String, String)>` as a map while keeping key order.
mod ordered_pairs {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(pairs: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (k, v) in pairs {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of regex pattern to replacement")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs: Vec<(String, String)> = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    match pairs.iter_mut().find(|entry| entry.0 == k) {
                        Some(entry) => entry.1 = v,
                        None => pairs.push((k, v)),
                    }
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}
