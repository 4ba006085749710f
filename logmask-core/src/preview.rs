// logmask-core/src/preview.rs
//! Size-capped, type-tagged previews of values for audit records, error
//! messages and debug logs, plus a stable fingerprint for correlating audit
//! events without storing the value itself.

use log::debug;
use once_cell::sync::Lazy;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::coercion::type_name;

/// Maximum number of characters kept in a preview.
pub const MAX_PREVIEW_CHARS: usize = 100;

/// Determined once: whether raw values may appear in debug logs.
static PII_DEBUG_ALLOWED: Lazy<bool> = Lazy::new(|| {
    std::env::var("LOGMASK_ALLOW_DEBUG_PII")
        .map(|s| s.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
});

/// Preview for the audit channel. Scalars are kept (strings truncated to
/// `MAX_PREVIEW_CHARS`); containers become a type tag with their size.
pub fn audit_preview(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(truncate(s, MAX_PREVIEW_CHARS)),
        Value::Array(items) => Value::String(format!("[array:{} items]", items.len())),
        Value::Object(map) => Value::String(format!("[object:{} keys]", map.len())),
        scalar => scalar.clone(),
    }
}

/// Content-free description of a value: its type and size only.
pub fn redact_preview(value: &Value) -> String {
    match value {
        Value::String(s) => format!("[{}:{} chars]", type_name(value), s.chars().count()),
        Value::Array(items) => format!("[array:{} items]", items.len()),
        Value::Object(map) => format!("[object:{} keys]", map.len()),
        other => format!("[{}]", type_name(other)),
    }
}

const ELLIPSIS: &str = "...";

/// Caps `s` at `max_chars` characters, ellipsis included.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let idx = s.char_indices().nth(keep).map_or(s.len(), |(idx, _)| idx);
    format!("{}{}", &s[..idx], ELLIPSIS)
}

/// SHA-256 over the path and the canonical JSON of the value.
pub fn fingerprint(path: &str, value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b":");
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn loggable(value: &Value) -> String {
    if *PII_DEBUG_ALLOWED {
        truncate(&value.to_string(), MAX_PREVIEW_CHARS)
    } else {
        redact_preview(value)
    }
}

pub fn log_masking_debug(strategy: &str, path: &str, original: &Value, masked: &Value) {
    debug!(
        "Strategy '{}' masked '{}': Original='{}', Masked='{}'",
        strategy,
        path,
        loggable(original),
        loggable(masked)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audit_preview_caps_strings() {
        let long = "x".repeat(300);
        let preview = audit_preview(&json!(long));
        let preview = preview.as_str().unwrap_or_default();
        assert_eq!(preview.chars().count(), MAX_PREVIEW_CHARS);
        assert!(preview.ends_with("..."));
        assert_eq!(audit_preview(&json!(42)), json!(42));
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let exact = "é".repeat(MAX_PREVIEW_CHARS);
        assert_eq!(truncate(&exact, MAX_PREVIEW_CHARS), exact);
        let over = truncate(&"é".repeat(MAX_PREVIEW_CHARS + 1), MAX_PREVIEW_CHARS);
        assert!(over.chars().count() <= MAX_PREVIEW_CHARS);
        assert_eq!(over, format!("{}...", "é".repeat(MAX_PREVIEW_CHARS - 3)));
    }

    #[test]
    fn test_audit_preview_tags_containers() {
        assert_eq!(audit_preview(&json!([1, 2, 3])), json!("[array:3 items]"));
        assert_eq!(audit_preview(&json!({"a": 1})), json!("[object:1 keys]"));
    }

    #[test]
    fn test_redact_preview_has_no_content() {
        assert_eq!(redact_preview(&json!("secret")), "[string:6 chars]");
        assert_eq!(redact_preview(&json!(12)), "[integer]");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint("user.ssn", &json!("123-45-6789"));
        let b = fingerprint("user.ssn", &json!("123-45-6789"));
        assert_eq!(a, b);
        assert_ne!(a, fingerprint("user.tin", &json!("123-45-6789")));
    }
}
