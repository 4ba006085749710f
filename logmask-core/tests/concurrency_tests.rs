// logmask-core/tests/concurrency_tests.rs
use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;

use logmask_core::{
    FieldRule, MaskingConfig, MaskingEngine, PatternCache, PatternValidator, RateLimitConfig, RateLimiter,
    RecordContext,
};

#[test]
fn test_shared_engine_is_deterministic_across_threads() -> Result<()> {
    let config = MaskingConfig::default()
        .with_pattern(r"\b\d{3}-\d{2}-\d{4}\b", "***-**-****")
        .with_field_rule("user.*", FieldRule::literal("[user]"));
    let engine = Arc::new(MaskingEngine::from_config(config)?);
    let context = json!({"user": {"name": "Ada", "age": 36}, "note": "ssn 123-45-6789"});
    let expected = json!({"user": {"name": "[user]", "age": "[user]"}, "note": "ssn ***-**-****"});

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let context = context.as_object().cloned().unwrap_or_default();
            thread::spawn(move || {
                (0..50)
                    .map(|_| engine.process("", &context, &RecordContext::default()).map(|m| Value::Object(m.context)))
                    .collect::<Result<Vec<_>, _>>()
            })
        })
        .collect();

    for handle in handles {
        let results = handle.join().expect("worker panicked")?;
        assert!(results.iter().all(|r| r == &expected));
    }
    Ok(())
}

#[test]
fn test_shared_pattern_cache_across_engines() -> Result<()> {
    let cache = PatternCache::new();
    let config = MaskingConfig::default().with_pattern(r"tok_[a-z0-9]{8}", "[token]");
    let first = MaskingEngine::builder(config.clone()).pattern_cache(cache.clone()).build()?;
    let entries = cache.len();
    assert!(entries >= 1);
    let second = MaskingEngine::builder(config).pattern_cache(cache.clone()).build()?;
    assert_eq!(cache.len(), entries);

    let ctx = serde_json::Map::new();
    let record = RecordContext::default();
    assert_eq!(first.process("tok_abcd1234", &ctx, &record)?.message, "[token]");
    assert_eq!(second.process("tok_abcd1234", &ctx, &record)?.message, "[token]");
    Ok(())
}

#[test]
fn test_concurrent_validation_agrees() {
    let validator = Arc::new(PatternValidator::new());
    let patterns = ["(a+)+$", "(a*)*", "(x+){2,5}", r"^[a-z]+@[a-z]+\.[a-z]{2,}$"];
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let validator = Arc::clone(&validator);
            thread::spawn(move || patterns.map(|p| validator.is_valid(p)))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("worker panicked"), [false, false, false, true]);
    }
}

#[test]
fn test_rate_limiter_admits_exactly_capacity_under_contention() -> Result<()> {
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(100, 60))?);
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            thread::spawn(move || (0..50).filter(|_| limiter.is_allowed("audit:masked").unwrap_or(false)).count())
        })
        .collect();
    let admitted: usize = handles
        .into_iter()
        .map(|h| h.join().expect("worker panicked"))
        .sum();
    assert_eq!(admitted, 100);
    assert_eq!(limiter.remaining("audit:masked")?, 0);
    Ok(())
}
