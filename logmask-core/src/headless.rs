// File: logmask-core/src/headless.rs

//! `headless.rs`
//! Convenience wrapper for one-shot masking without keeping an engine around.
//! Useful for scripts and tests; long-running hosts should build a
//! [`MaskingEngine`] once and reuse it.

use serde_json::{Map, Value};

use crate::config::MaskingConfig;
use crate::engine::{MaskedRecord, MaskingEngine};
use crate::errors::MaskingError;
use crate::record::RecordContext;

/// Builds an engine from `config` and masks a single message and context.
///
/// # Arguments
///
/// * `config` - The masking configuration (validated here).
/// * `message` - The log message to mask.
/// * `context` - The structured context to mask.
pub fn headless_mask(
    config: MaskingConfig,
    message: &str,
    context: &Map<String, Value>,
) -> Result<MaskedRecord, MaskingError> {
    let engine = MaskingEngine::from_config(config)?;
    engine.process(message, context, &RecordContext::default())
}
