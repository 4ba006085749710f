// logmask-core/src/strategies/callback.rs
//! A `MaskingStrategy` that hands selected values to a user-supplied
//! function. Errors and panics from the function are converted into
//! `MaskingOperationFailed` and never escape into the traversal.
//! License: MIT OR APACHE 2.0

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use super::CALLBACK_PRIORITY;
use crate::coercion;
use crate::errors::{panic_message, MaskingError};
use crate::path;
use crate::preview::redact_preview;
use crate::record::{MaskResult, RecordContext};
use crate::strategy::MaskingStrategy;

/// A pure masking function.
pub type MaskCallback = Arc<dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync>;

pub struct CallbackMaskingStrategy {
    name: String,
    priority: i32,
    paths: Vec<String>,
    callback: MaskCallback,
    preserve_types: bool,
}

impl std::fmt::Debug for CallbackMaskingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackMaskingStrategy")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("paths", &self.paths)
            .field("preserve_types", &self.preserve_types)
            .finish_non_exhaustive()
    }
}

impl CallbackMaskingStrategy {
    /// Binds `callback` to a single path (exact or wildcard).
    pub fn new<F>(field_path: impl Into<String>, callback: F) -> Result<Self, MaskingError>
    where
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::builder().path(field_path).callback(callback).build()
    }

    pub fn builder() -> CallbackStrategyBuilder {
        CallbackStrategyBuilder::default()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    fn invoke(&self, value: &Value, field_path: &str) -> Result<Value, MaskingError> {
        match catch_unwind(AssertUnwindSafe(|| (self.callback)(value))) {
            Ok(Ok(masked)) => Ok(masked),
            Ok(Err(e)) => Err(MaskingError::operation_failed(
                &self.name,
                field_path,
                redact_preview(value),
                format!("{:#}", e),
            )),
            Err(payload) => Err(MaskingError::operation_failed(
                &self.name,
                field_path,
                redact_preview(value),
                format!("callback panicked: {}", panic_message(payload)),
            )),
        }
    }
}

impl MaskingStrategy for CallbackMaskingStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn should_apply(&self, _value: &Value, field_path: &str, _record: &RecordContext) -> bool {
        self.paths.iter().any(|p| path::matches(p, field_path))
    }

    /// Exact paths receive the whole map or array they address.
    fn masks_container(&self, field_path: &str) -> bool {
        self.paths.iter().any(|p| !path::is_wildcard(p) && p == field_path)
    }

    fn apply(&self, value: &Value, field_path: &str, _record: &RecordContext) -> Result<MaskResult, MaskingError> {
        self.invoke(value, field_path).map(MaskResult::Value)
    }

    fn preserve_type(&self, original: &Value, masked: Value) -> Value {
        if self.preserve_types {
            coercion::preserve_type(original, masked)
        } else {
            masked
        }
    }
}

/// Builds a [`CallbackMaskingStrategy`] bound to one or many paths.
#[derive(Default)]
pub struct CallbackStrategyBuilder {
    name: Option<String>,
    priority: Option<i32>,
    paths: Vec<String>,
    callback: Option<MaskCallback>,
    preserve_types: bool,
}

impl CallbackStrategyBuilder {
    pub fn path(mut self, field_path: impl Into<String>) -> Self {
        self.paths.push(field_path.into());
        self
    }

    pub fn paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn shared_callback(mut self, callback: MaskCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Converts string results back into the original primitive type.
    pub fn preserve_types(mut self, preserve: bool) -> Self {
        self.preserve_types = preserve;
        self
    }

    pub fn build(self) -> Result<CallbackMaskingStrategy, MaskingError> {
        if self.paths.is_empty() {
            return Err(MaskingError::InvalidConfiguration(
                "callback strategy requires at least one field path".to_string(),
            ));
        }
        self.paths.iter().try_for_each(|p| path::validate(p))?;
        let callback = self.callback.ok_or_else(|| {
            MaskingError::InvalidConfiguration("callback strategy requires a callback".to_string())
        })?;
        let name = self
            .name
            .unwrap_or_else(|| format!("callback({})", self.paths.join(",")));
        Ok(CallbackMaskingStrategy {
            name,
            priority: self.priority.unwrap_or(CALLBACK_PRIORITY),
            paths: self.paths,
            callback,
            preserve_types: self.preserve_types,
        })
    }
}
