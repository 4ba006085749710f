// logmask-core/src/processor.rs
//! Depth-bounded, size-aware traversal of a record's message and context.
//!
//! The message is regex-masked directly. The context is walked depth first:
//! every leaf is dispatched through the [`StrategyManager`] inside the
//! [`RecoveryStrategy`], and every change produces an [`AuditEvent`].
//! A map or array addressed by a path rule is masked as a whole and not
//! descended into. Containers at or beyond `max_depth` are returned untouched.
//!
//! License: MIT OR APACHE 2.0

use std::sync::Arc;

use log::{debug, trace, warn};
use serde_json::{Map, Value};

use crate::audit::AuditEvent;
use crate::config::{DepthPolicy, DEFAULT_MAX_DEPTH, MAX_DEPTH_LIMIT};
use crate::errors::MaskingError;
use crate::manager::StrategyManager;
use crate::path;
use crate::patterns::PatternSet;
use crate::preview::log_masking_debug;
use crate::record::{MaskResult, RecordContext};
use crate::recovery::{RecoveryStatus, RecoveryStrategy};
use crate::strategy::MaskingStrategy;

/// Containers with more entries than this are processed in batches.
pub const CHUNK_THRESHOLD: usize = 1_000;
/// Entries per batch on the chunked path.
pub const CHUNK_SIZE: usize = 500;
/// Above this size the batch buffer is released between batches.
pub const RECLAIM_THRESHOLD: usize = 10_000;

/// Depth bookkeeping for one traversal. Passed by value, never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalState {
    pub current_depth: usize,
    pub max_depth: usize,
}

impl TraversalState {
    pub fn new(max_depth: usize) -> Self {
        Self {
            current_depth: 0,
            max_depth,
        }
    }

    pub fn descend(self) -> Self {
        Self {
            current_depth: self.current_depth + 1,
            ..self
        }
    }

    pub fn at_limit(&self) -> bool {
        self.current_depth >= self.max_depth
    }
}

/// The output of one [`RecursiveProcessor::mask`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRecord {
    pub message: String,
    pub context: Map<String, Value>,
    pub audit_events: Vec<AuditEvent>,
}

#[derive(Debug)]
pub struct RecursiveProcessor {
    manager: Arc<StrategyManager>,
    recovery: RecoveryStrategy,
    message_patterns: PatternSet,
    max_depth: usize,
    depth_policy: DepthPolicy,
}

impl RecursiveProcessor {
    pub fn new(manager: Arc<StrategyManager>, recovery: RecoveryStrategy) -> Self {
        Self {
            manager,
            recovery,
            message_patterns: PatternSet::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            depth_policy: DepthPolicy::default(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Result<Self, MaskingError> {
        if max_depth == 0 || max_depth > MAX_DEPTH_LIMIT {
            return Err(MaskingError::InvalidConfiguration(format!(
                "max_depth must be between 1 and {}, got {}",
                MAX_DEPTH_LIMIT, max_depth
            )));
        }
        self.max_depth = max_depth;
        Ok(self)
    }

    pub fn with_message_patterns(mut self, patterns: PatternSet) -> Self {
        self.message_patterns = patterns;
        self
    }

    pub fn with_depth_policy(mut self, policy: DepthPolicy) -> Self {
        self.depth_policy = policy;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn manager(&self) -> &Arc<StrategyManager> {
        &self.manager
    }

    /// Masks the message and the context of one record.
    pub fn mask(
        &self,
        message: &str,
        context: &Map<String, Value>,
        record: &RecordContext,
    ) -> Result<ProcessedRecord, MaskingError> {
        let message = self.mask_message(message);
        let (context, audit_events) = self.mask_context(context, record)?;
        Ok(ProcessedRecord {
            message,
            context,
            audit_events,
        })
    }

    /// Applies the message patterns in order.
    pub fn mask_message(&self, message: &str) -> String {
        self.message_patterns.apply(message).into_owned()
    }

    /// Walks `context`, returning the masked copy and the audit events.
    pub fn mask_context(
        &self,
        context: &Map<String, Value>,
        record: &RecordContext,
    ) -> Result<(Map<String, Value>, Vec<AuditEvent>), MaskingError> {
        let mut events = Vec::new();
        let masked = self.walk_map(context, "", TraversalState::new(self.max_depth), record, &mut events)?;
        debug!(
            "Masked context with {} top-level keys; {} audit event(s).",
            masked.len(),
            events.len()
        );
        Ok((masked, events))
    }

    fn walk_map(
        &self,
        map: &Map<String, Value>,
        parent: &str,
        state: TraversalState,
        record: &RecordContext,
        events: &mut Vec<AuditEvent>,
    ) -> Result<Map<String, Value>, MaskingError> {
        let mut out = Map::new();
        if map.len() <= CHUNK_THRESHOLD {
            for (key, value) in map {
                let child = path::join(parent, key);
                if let Some(masked) = self.visit(value, &child, state, record, events)? {
                    out.insert(key.clone(), masked);
                }
            }
            return Ok(out);
        }

        let entries: Vec<(&String, &Value)> = map.iter().collect();
        let mut batch: Vec<(String, Value)> = Vec::with_capacity(CHUNK_SIZE);
        for (index, chunk) in entries.chunks(CHUNK_SIZE).enumerate() {
            for (key, value) in chunk {
                let child = path::join(parent, key);
                if let Some(masked) = self.visit(value, &child, state, record, events)? {
                    batch.push(((*key).clone(), masked));
                }
            }
            out.extend(batch.drain(..));
            if map.len() > RECLAIM_THRESHOLD {
                batch.shrink_to_fit();
            }
            trace!("Processed batch {} of map '{}' ({} entries).", index + 1, parent, map.len());
        }
        Ok(out)
    }

    fn walk_array(
        &self,
        items: &[Value],
        parent: &str,
        state: TraversalState,
        record: &RecordContext,
        events: &mut Vec<AuditEvent>,
    ) -> Result<Vec<Value>, MaskingError> {
        let mut out = Vec::with_capacity(items.len());
        if items.len() <= CHUNK_THRESHOLD {
            for (index, value) in items.iter().enumerate() {
                let child = path::join(parent, &index.to_string());
                if let Some(masked) = self.visit(value, &child, state, record, events)? {
                    out.push(masked);
                }
            }
            return Ok(out);
        }

        let mut batch: Vec<Value> = Vec::with_capacity(CHUNK_SIZE);
        for (chunk_index, chunk) in items.chunks(CHUNK_SIZE).enumerate() {
            let offset = chunk_index * CHUNK_SIZE;
            for (i, value) in chunk.iter().enumerate() {
                let child = path::join(parent, &(offset + i).to_string());
                if let Some(masked) = self.visit(value, &child, state, record, events)? {
                    batch.push(masked);
                }
            }
            out.append(&mut batch);
            if items.len() > RECLAIM_THRESHOLD {
                batch.shrink_to_fit();
            }
            trace!("Processed batch {} of array '{}' ({} items).", chunk_index + 1, parent, items.len());
        }
        Ok(out)
    }

    /// Returns `None` when the entry must be removed from its parent.
    fn visit(
        &self,
        value: &Value,
        field_path: &str,
        state: TraversalState,
        record: &RecordContext,
        events: &mut Vec<AuditEvent>,
    ) -> Result<Option<Value>, MaskingError> {
        let inner = state.descend();
        match value {
            Value::Object(_) | Value::Array(_) if inner.at_limit() => {
                self.truncate(value, field_path, inner, events).map(Some)
            }
            Value::Object(map) => match self.manager.resolve_container(value, field_path, record) {
                Some(strategy) => self.mask_with(strategy.as_ref(), value, field_path, record, events),
                None => Ok(Some(Value::Object(
                    self.walk_map(map, field_path, inner, record, events)?,
                ))),
            },
            Value::Array(items) => match self.manager.resolve_container(value, field_path, record) {
                Some(strategy) => self.mask_with(strategy.as_ref(), value, field_path, record, events),
                None => Ok(Some(Value::Array(
                    self.walk_array(items, field_path, inner, record, events)?,
                ))),
            },
            leaf => match self.manager.resolve(leaf, field_path, record) {
                Some(strategy) => self.mask_with(strategy.as_ref(), leaf, field_path, record, events),
                None => Ok(Some(leaf.clone())),
            },
        }
    }

    fn truncate(
        &self,
        subtree: &Value,
        field_path: &str,
        state: TraversalState,
        events: &mut Vec<AuditEvent>,
    ) -> Result<Value, MaskingError> {
        match self.depth_policy {
            DepthPolicy::Truncate => {
                warn!(
                    "Max depth {} reached at '{}'; leaving subtree unmodified.",
                    state.max_depth, field_path
                );
                events.push(AuditEvent::max_depth_reached(field_path, state.current_depth, subtree));
                Ok(subtree.clone())
            }
            DepthPolicy::Error => Err(MaskingError::RecursionDepthExceeded {
                path: field_path.to_string(),
                depth: state.current_depth,
                max_depth: state.max_depth,
            }),
        }
    }

    /// Runs `strategy` on `value` under recovery and records the change.
    fn mask_with(
        &self,
        strategy: &dyn MaskingStrategy,
        value: &Value,
        field_path: &str,
        record: &RecordContext,
        events: &mut Vec<AuditEvent>,
    ) -> Result<Option<Value>, MaskingError> {
        let outcome = self.recovery.execute(
            || {
                Ok(match strategy.apply(value, field_path, record)? {
                    MaskResult::Value(masked) => MaskResult::Value(strategy.preserve_type(value, masked)),
                    MaskResult::Remove => MaskResult::Remove,
                })
            },
            value,
            field_path,
        );

        if outcome.status == RecoveryStatus::Fallback {
            let details = outcome.to_audit_context();
            let fallback = outcome.into_result()?;
            let fallback = fallback.into_value().unwrap_or(Value::Null);
            events.push(AuditEvent::recovery_fallback(field_path, value, &fallback, details));
            return Ok(Some(fallback));
        }

        match outcome.into_result()? {
            MaskResult::Remove => {
                debug!("Strategy '{}' removed '{}'.", strategy.name(), field_path);
                events.push(AuditEvent::removed(field_path, strategy.name(), value));
                Ok(None)
            }
            MaskResult::Value(masked) => {
                if masked != *value {
                    log_masking_debug(strategy.name(), field_path, value, &masked);
                    events.push(AuditEvent::masked(field_path, strategy.name(), value, &masked));
                }
                Ok(Some(masked))
            }
        }
    }
}
