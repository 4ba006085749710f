// logmask-core/src/engine.rs
//! The `MaskingEngine` orchestrator and its builder.
//!
//! The builder turns a validated [`MaskingConfig`] plus non-serializable
//! pieces (callbacks, record conditions, an audit sink, custom strategies)
//! into a ready engine. Everything that can fail is checked in
//! [`MaskingEngineBuilder::build`]; a built engine is immutable and may be
//! shared across threads.
//!
//! License: MIT OR APACHE 2.0

use std::sync::Arc;

use log::{debug, info};
use serde_json::{Map, Value};

use crate::audit::{AuditEvent, AuditSink, AuditStats, RateLimitedAuditLogger};
use crate::config::MaskingConfig;
use crate::errors::MaskingError;
use crate::manager::StrategyManager;
use crate::patterns::{PatternCache, PatternSet, PatternValidator};
use crate::processor::RecursiveProcessor;
use crate::record::RecordContext;
use crate::recovery::RecoveryStrategy;
use crate::strategies::{
    CallbackMaskingStrategy, Condition, ConditionSet, ConditionalMaskingStrategy, Conjunction,
    DataTypeMaskingStrategy, FieldPathMaskingStrategy, MaskCallback, RegexMaskingStrategy,
};
use crate::strategy::{MaskingStrategy, StrategySummary};

/// The masked message and context handed back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedRecord {
    pub message: String,
    pub context: Map<String, Value>,
}

#[derive(Debug)]
pub struct MaskingEngine {
    config: MaskingConfig,
    processor: RecursiveProcessor,
    conditions: ConditionSet,
    audit: RateLimitedAuditLogger,
}

impl MaskingEngine {
    pub fn builder(config: MaskingConfig) -> MaskingEngineBuilder {
        MaskingEngineBuilder::new(config)
    }

    /// An engine from configuration alone: no callbacks, conditions or sink.
    pub fn from_config(config: MaskingConfig) -> Result<Self, MaskingError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &MaskingConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<StrategyManager> {
        self.processor.manager()
    }

    /// Registered strategies in dispatch order.
    pub fn strategies(&self) -> Vec<StrategySummary> {
        self.manager().summaries()
    }

    pub fn audit_stats(&self) -> AuditStats {
        self.audit.stats()
    }

    /// Masks one record's message and context.
    ///
    /// Record conditions gate the message pass and every built-in strategy.
    /// Audit events are forwarded to the sink, subject to the audit rate limit.
    pub fn process(
        &self,
        message: &str,
        context: &Map<String, Value>,
        record: &RecordContext,
    ) -> Result<MaskedRecord, MaskingError> {
        let (masked, events) = self.process_with_events(message, context, record)?;
        self.audit.log_all(&events);
        Ok(masked)
    }

    /// Like [`Self::process`], but returns the audit events to the caller
    /// instead of forwarding them.
    pub fn process_with_events(
        &self,
        message: &str,
        context: &Map<String, Value>,
        record: &RecordContext,
    ) -> Result<(MaskedRecord, Vec<AuditEvent>), MaskingError> {
        let message = if self.conditions.is_satisfied(record) {
            self.processor.mask_message(message)
        } else {
            debug!("Record conditions not met; message left unmasked.");
            message.to_string()
        };
        let (context, events) = self.processor.mask_context(context, record)?;
        Ok((MaskedRecord { message, context }, events))
    }

    /// Masks the message and context carried by `record` itself.
    pub fn process_record(&self, record: &RecordContext) -> Result<RecordContext, MaskingError> {
        let masked = self.process(&record.message, &record.context, record)?;
        Ok(RecordContext {
            message: masked.message,
            context: masked.context,
            ..record.clone()
        })
    }
}

/// Collects everything a [`MaskingEngine`] needs.
pub struct MaskingEngineBuilder {
    config: MaskingConfig,
    callbacks: Vec<(String, MaskCallback)>,
    callback_strategies: Vec<CallbackMaskingStrategy>,
    conditions: ConditionSet,
    audit_sink: Option<AuditSink>,
    custom: Vec<Arc<dyn MaskingStrategy>>,
    cache: Option<PatternCache>,
}

impl MaskingEngineBuilder {
    pub fn new(config: MaskingConfig) -> Self {
        Self {
            config,
            callbacks: Vec::new(),
            callback_strategies: Vec::new(),
            conditions: ConditionSet::default(),
            audit_sink: None,
            custom: Vec::new(),
            cache: None,
        }
    }

    /// Masks values at `path` (exact or wildcard) with `callback`.
    pub fn callback<F>(mut self, path: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.callbacks.push((path.into(), Arc::new(callback)));
        self
    }

    /// Registers a callback strategy built with [`CallbackMaskingStrategy::builder`].
    pub fn callback_strategy(mut self, strategy: CallbackMaskingStrategy) -> Self {
        self.callback_strategies.push(strategy);
        self
    }

    /// Adds a record-level condition gating the built-in strategies.
    pub fn condition(mut self, name: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push(name, condition);
        self
    }

    pub fn conjunction(mut self, conjunction: Conjunction) -> Self {
        self.conditions.set_conjunction(conjunction);
        self
    }

    pub fn audit_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str, &Value, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.audit_sink = Some(Arc::new(sink));
        self
    }

    /// Registers a strategy as is. Custom strategies are not gated by
    /// record conditions.
    pub fn strategy(mut self, strategy: Arc<dyn MaskingStrategy>) -> Self {
        self.custom.push(strategy);
        self
    }

    /// Shares a pattern cache with other engines.
    pub fn pattern_cache(mut self, cache: PatternCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<MaskingEngine, MaskingError> {
        let validator = match self.cache {
            Some(cache) => PatternValidator::with_cache(cache),
            None => PatternValidator::new(),
        };
        let config = self.config;
        config.validate(&validator)?;

        let patterns = config.effective_patterns()?;
        let message_patterns = PatternSet::compile(&validator, patterns.iter().map(|(p, r)| (p, r.clone())))?;

        let mut builtin: Vec<Arc<dyn MaskingStrategy>> = Vec::new();
        for (path, callback) in self.callbacks {
            let strategy = CallbackMaskingStrategy::builder()
                .path(path)
                .shared_callback(callback)
                .build()?;
            builtin.push(Arc::new(strategy));
        }
        for strategy in self.callback_strategies {
            builtin.push(Arc::new(strategy));
        }
        if !config.field_rules.is_empty() {
            builtin.push(Arc::new(FieldPathMaskingStrategy::new(&validator, &config.field_rules)?));
        }
        if !message_patterns.is_empty() {
            let regex = RegexMaskingStrategy::from_pattern_set(message_patterns.clone())
                .with_include_paths(config.regex_include_paths.clone())?
                .with_exclude_paths(config.regex_exclude_paths.clone())?;
            builtin.push(Arc::new(regex));
        }
        if !config.data_type_masks.is_empty() {
            let data_type = DataTypeMaskingStrategy::new(config.typed_data_type_masks()?)
                .with_exclude_paths(config.data_type_exclude_paths.clone())?;
            builtin.push(Arc::new(data_type));
        }

        let manager = Arc::new(StrategyManager::new());
        for strategy in builtin {
            if self.conditions.is_empty() {
                manager.add_strategy(strategy);
            } else {
                manager.add_strategy(Arc::new(ConditionalMaskingStrategy::with_condition_set(
                    strategy,
                    self.conditions.clone(),
                )));
            }
        }
        for strategy in self.custom {
            manager.add_strategy(strategy);
        }

        let recovery = RecoveryStrategy::new(config.retry, config.failure_mode)?;
        let processor = RecursiveProcessor::new(Arc::clone(&manager), recovery)
            .with_max_depth(config.max_depth)?
            .with_message_patterns(message_patterns)
            .with_depth_policy(config.on_max_depth);
        let audit = RateLimitedAuditLogger::new(self.audit_sink, config.audit_rate_limit.clone())?;

        info!(
            "Masking engine ready: {} strategies, {} message patterns, max depth {}.",
            manager.len(),
            patterns.len(),
            config.max_depth
        );
        Ok(MaskingEngine {
            config,
            processor,
            conditions: self.conditions,
            audit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataType, FieldRule, MaskRule};
    use crate::record::LogLevel;
    use crate::strategies::conditions;
    use serde_json::json;
    use std::sync::Mutex;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_builtin_priorities() {
        let config = MaskingConfig::default()
            .with_pattern(r"\d+", "#")
            .with_field_rule("user.ssn", FieldRule::remove())
            .with_data_type_mask(DataType::Integer, "0");
        let engine = MaskingEngine::builder(config)
            .callback("user.email", |_: &Value| Ok(json!("[cb]")))
            .build()
            .unwrap();
        let names: Vec<_> = engine.strategies().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["callback(user.email)", "field_path", "regex", "data_type"]);
    }

    #[test]
    fn test_conditions_gate_message_and_context() {
        let config = MaskingConfig::default()
            .with_pattern(r"\d{3}-\d{2}-\d{4}", "***-**-****")
            .with_field_rule("token", MaskRule::replace("[token]").unwrap());
        let engine = MaskingEngine::builder(config)
            .condition("errors_only", conditions::level_at_least(LogLevel::Error))
            .build()
            .unwrap();
        let ctx = object(json!({"token": "abc"}));

        let info = RecordContext::new(LogLevel::Info, "app");
        let out = engine.process("ssn 123-45-6789", &ctx, &info).unwrap();
        assert_eq!(out.message, "ssn 123-45-6789");
        assert_eq!(out.context["token"], json!("abc"));

        let error = RecordContext::new(LogLevel::Error, "app");
        let out = engine.process("ssn 123-45-6789", &ctx, &error).unwrap();
        assert_eq!(out.message, "ssn ***-**-****");
        assert_eq!(out.context["token"], json!("[token]"));
    }

    #[test]
    fn test_audit_sink_receives_previews_and_failures_are_contained() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let clone = Arc::clone(&seen);
        let engine = MaskingEngine::builder(MaskingConfig::default().with_field_rule("pin", FieldRule::literal("****")))
            .audit_sink(move |path: &str, original: &Value, masked: &Value| {
                clone.lock().unwrap().push((path.to_string(), original.clone(), masked.clone()));
                anyhow::bail!("sink offline")
            })
            .build()
            .unwrap();
        let out = engine
            .process("", &object(json!({"pin": "1234"})), &RecordContext::default())
            .unwrap();
        assert_eq!(out.context["pin"], json!("****"));
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [("pin".to_string(), json!("1234"), json!("****"))]
        );
        assert_eq!(engine.audit_stats().failed, 1);
    }

    #[test]
    fn test_invalid_configuration_fails_fast() {
        assert!(MaskingEngine::from_config(MaskingConfig::default().with_pattern("(a+)+$", "x")).is_err());
        assert!(MaskingEngine::from_config(MaskingConfig::default().with_max_depth(5000)).is_err());
        assert!(MaskingEngine::builder(MaskingConfig::default())
            .callback("", |v: &Value| Ok(v.clone()))
            .build()
            .is_err());
    }

    #[test]
    fn test_process_record() {
        let engine = MaskingEngine::from_config(MaskingConfig::default().with_pattern(r"\d", "#")).unwrap();
        let record = RecordContext::new(LogLevel::Info, "app")
            .with_message("code 42")
            .with_context(object(json!({"pin": "7"})));
        let masked = engine.process_record(&record).unwrap();
        assert_eq!(masked.message, "code ##");
        assert_eq!(masked.context["pin"], json!("#"));
        assert_eq!(masked.channel, "app");
    }
}
