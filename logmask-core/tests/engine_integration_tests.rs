// logmask-core/tests/engine_integration_tests.rs
use anyhow::Result;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use test_log::test; // For integrating with `env_logger` in tests

use logmask_core::{
    conditions, headless_mask, CallbackMaskingStrategy, Conjunction, DataType, FailureMode, FieldRule, LogLevel,
    MaskRule, MaskingConfig, MaskingEngine, RecordContext,
};

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn test_message_patterns_apply_in_order() -> Result<()> {
    let config = MaskingConfig::default()
        .with_pattern(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}", "[email]")
        .with_pattern(r"\d{3}-\d{2}-\d{4}", "***-**-****");
    let masked = headless_mask(config, "User john@example.com, SSN 123-45-6789", &Map::new())?;
    assert_eq!(masked.message, "User [email], SSN ***-**-****");
    Ok(())
}

#[test]
fn test_remove_rule_deletes_key() -> Result<()> {
    let config = MaskingConfig::default().with_field_rule("user.ssn", FieldRule::remove());
    let masked = headless_mask(config, "", &object(json!({"user": {"ssn": "123-45-6789"}})))?;
    assert_eq!(Value::Object(masked.context), json!({"user": {}}));
    Ok(())
}

#[test]
fn test_field_rules_on_container_paths() -> Result<()> {
    let config = MaskingConfig::default()
        .with_field_rule("user.address", FieldRule::remove())
        .with_field_rule("user.credentials", MaskRule::replace("[hidden]")?)
        .with_field_rule("user.devices", FieldRule::remove());
    let context = object(json!({"user": {
        "name": "Ada",
        "address": {"street": "1 Main St", "zip": "10115"},
        "credentials": {"password": "hunter2"},
        "devices": [{"serial": "A1"}, {"serial": "B2"}]
    }}));
    let masked = headless_mask(config, "", &context)?;
    assert_eq!(
        Value::Object(masked.context),
        json!({"user": {"name": "Ada", "credentials": "[hidden]"}})
    );
    Ok(())
}

#[test]
fn test_callback_receives_whole_container() -> Result<()> {
    let engine = MaskingEngine::builder(MaskingConfig::default())
        .callback("order.items", |v: &Value| {
            Ok(json!(format!("[{} items]", v.as_array().map_or(0, Vec::len))))
        })
        .build()?;
    let context = object(json!({"order": {"items": [{"sku": "X"}, {"sku": "Y"}], "id": 7}}));
    let masked = engine.process("", &context, &RecordContext::default())?;
    assert_eq!(masked.context["order"], json!({"items": "[2 items]", "id": 7}));
    Ok(())
}

#[test]
fn test_integer_mask_keeps_integer_type() -> Result<()> {
    let config = MaskingConfig::default().with_data_type_mask(DataType::Integer, "999");
    let masked = headless_mask(config, "", &object(json!({"count": 42})))?;
    assert_eq!(Value::Object(masked.context), json!({"count": 999}));
    Ok(())
}

#[test]
fn test_yaml_configured_engine() -> Result<()> {
    let yaml = r#"
patterns:
  '\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{4}\b': '[card]'
field_rules:
  user.password:
    kind: REMOVE
  user.email:
    kind: REGEX_MASK
    pattern: '^[^@]+'
    replacement: '***'
  'session.*': '[session]'
data_type_masks:
  boolean: 'false'
data_type_exclude_paths:
  - 'flags.*'
max_depth: 4
failure_mode: fail_closed
retry:
  max_attempts: 2
  base_delay_ms: 0
  max_delay_ms: 0
"#;
    let engine = MaskingEngine::from_config(MaskingConfig::from_yaml_str(yaml)?)?;
    let context = object(json!({
        "user": {"password": "hunter2", "email": "ada@example.com", "admin": true},
        "session": {"id": "abc", "meta": {"ip": "10.0.0.1"}},
        "flags": {"beta": true},
        "payment": "card 4111 1111 1111 1111 charged"
    }));
    let masked = engine.process("", &context, &RecordContext::default())?;
    assert_eq!(
        Value::Object(masked.context),
        json!({
            "user": {"email": "***@example.com", "admin": false},
            "session": {"id": "[session]", "meta": {"ip": "[session]"}},
            "flags": {"beta": true},
            "payment": "card [card] charged"
        })
    );
    Ok(())
}

#[test]
fn test_bounded_group_patterns_build() -> Result<()> {
    let config = MaskingConfig::default()
        .with_pattern(r"\b(\d{1,3}\.){3}\d{1,3}\b", "[ip]")
        .with_pattern(r"(?:\d{3}-)+\d{4}", "[phone]");
    let masked = headless_mask(config, "from 192.168.0.12 call 555-123-4567", &Map::new())?;
    assert_eq!(masked.message, "from [ip] call [phone]");
    Ok(())
}

#[test]
fn test_callback_failure_degrades_to_shaped_fallback() -> Result<()> {
    let engine = MaskingEngine::builder(MaskingConfig::default())
        .callback("user.tax_id", |_: &Value| anyhow::bail!("tokenizer unavailable"))
        .build()?;
    let masked = engine.process("", &object(json!({"user": {"tax_id": "DE123456789"}})), &RecordContext::default())?;
    assert_eq!(masked.context["user"]["tax_id"], json!("[STRING:11 chars]"));
    Ok(())
}

#[test]
fn test_fail_open_returns_original() -> Result<()> {
    let config = MaskingConfig::default().with_failure_mode(FailureMode::FailOpen);
    let engine = MaskingEngine::builder(config)
        .callback("token", |_: &Value| anyhow::bail!("down"))
        .build()?;
    let masked = engine.process("", &object(json!({"token": "t0k3n"})), &RecordContext::default())?;
    assert_eq!(masked.context["token"], json!("t0k3n"));
    Ok(())
}

#[test]
fn test_callback_builder_binds_many_paths() -> Result<()> {
    let hash_last4 = CallbackMaskingStrategy::builder()
        .paths(["billing.card", "refund.*.card"])
        .callback(|v: &Value| {
            let s = v.as_str().unwrap_or_default();
            let tail: String = s.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            Ok(json!(format!("****{}", tail)))
        })
        .build()?;
    let engine = MaskingEngine::builder(MaskingConfig::default())
        .callback_strategy(hash_last4)
        .build()?;
    let context = object(json!({
        "billing": {"card": "4111111111111111"},
        "refund": [{"card": "5500000000000004"}]
    }));
    let masked = engine.process("", &context, &RecordContext::default())?;
    assert_eq!(masked.context["billing"]["card"], json!("****1111"));
    assert_eq!(masked.context["refund"][0]["card"], json!("****0004"));
    Ok(())
}

#[test]
fn test_or_conditions_on_channel_and_key() -> Result<()> {
    let config = MaskingConfig::default().with_field_rule("email", MaskRule::replace("[email]")?);
    let engine = MaskingEngine::builder(config)
        .condition("payments", conditions::channel_in(["payments"]))
        .condition("has_tenant", conditions::context_has_key("tenant"))
        .conjunction(Conjunction::Any)
        .build()?;
    let context = object(json!({"email": "a@b.co"}));

    let plain = RecordContext::new(LogLevel::Info, "web").with_context(context.clone());
    assert_eq!(engine.process("", &context, &plain)?.context["email"], json!("a@b.co"));

    let payments = RecordContext::new(LogLevel::Info, "payments");
    assert_eq!(engine.process("", &context, &payments)?.context["email"], json!("[email]"));

    let tenant = RecordContext::new(LogLevel::Info, "web").with_context(object(json!({"tenant": "acme"})));
    assert_eq!(engine.process("", &context, &tenant)?.context["email"], json!("[email]"));
    Ok(())
}

#[test]
fn test_audit_events_are_rate_limited() -> Result<()> {
    let mut config = MaskingConfig::default().with_pattern(r"\d", "#");
    config.audit_rate_limit = Some(logmask_core::RateLimitConfig::new(5, 60));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let engine = MaskingEngine::builder(config)
        .audit_sink(move |path: &str, _: &Value, masked: &Value| {
            sink_seen.lock().unwrap().push((path.to_string(), masked.clone()));
            Ok(())
        })
        .build()?;
    let context = object(json!({"a": "1", "b": "2", "c": "3", "d": "4", "e": "5", "f": "6", "g": "7"}));
    let masked = engine.process("", &context, &RecordContext::default())?;

    // Masking is never gated by the audit limit.
    assert!(masked.context.values().all(|v| v == &json!("#")));
    assert_eq!(seen.lock().unwrap().len(), 5);
    let stats = engine.audit_stats();
    assert_eq!((stats.emitted, stats.suppressed), (5, 2));
    Ok(())
}

#[test]
fn test_depth_limit_is_reported_to_audit_sink() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let engine = MaskingEngine::builder(MaskingConfig::default().with_pattern("secret", "[x]").with_max_depth(2))
        .audit_sink(move |path: &str, original: &Value, _: &Value| {
            sink_seen.lock().unwrap().push((path.to_string(), original.clone()));
            Ok(())
        })
        .build()?;
    let deep = json!({"a": {"b": {"c": {"d": {"e": {"f": {"g": "secret"}}}}}}});
    let masked = engine.process("", &object(deep.clone()), &RecordContext::default())?;
    assert_eq!(Value::Object(masked.context), deep);
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        [("a.b".to_string(), json!("[object:1 keys]"))]
    );
    Ok(())
}
