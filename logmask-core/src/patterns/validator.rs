//! validator.rs - Validates, compiles and caches masking patterns.
//!
//! This module provides a thread-safe, cached mechanism to turn pattern text
//! into a compiled `Regex`, rejecting anything that fails to compile or that
//! trips the backtracking heuristics in [`super::redos`]. The cache is an
//! explicitly owned object rather than global state, so an engine and all of
//! its strategies share exactly one.
//!
//! License: MIT OR APACHE 2.0

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, warn};
use regex::{Regex, RegexBuilder};

use super::redos::detect_backtracking_risk;
use crate::errors::{MaskingError, PatternErrorKind};

/// Maximum allowed length for a regex pattern string.
pub const MAX_PATTERN_LENGTH: usize = 500;

/// Maximum number of distinct patterns kept in a [`PatternCache`].
pub const MAX_CACHE_ENTRIES: usize = 1000;

/// 10 MB limit for a compiled regex.
const REGEX_SIZE_LIMIT: usize = 10 * (1 << 20);

#[derive(Debug, Clone)]
enum CacheEntry {
    Valid(Arc<Regex>),
    Rejected(MaskingError),
}

impl CacheEntry {
    fn into_result(self) -> Result<Arc<Regex>, MaskingError> {
        match self {
            CacheEntry::Valid(regex) => Ok(regex),
            CacheEntry::Rejected(e) => Err(e),
        }
    }
}

/// Shared cache of validated patterns keyed by pattern text.
///
/// Cloning is cheap and yields a handle to the same cache. Lookups take a
/// read lock only; a miss is computed outside any lock and inserted with
/// first-writer-wins semantics, so concurrent validators of the same pattern
/// all observe one entry.
#[derive(Debug, Clone, Default)]
pub struct PatternCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn get(&self, pattern: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
            .cloned()
    }

    fn insert(&self, pattern: &str, entry: CacheEntry) -> CacheEntry {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= MAX_CACHE_ENTRIES && !entries.contains_key(pattern) {
            debug!("Pattern cache reached {} entries; clearing.", MAX_CACHE_ENTRIES);
            entries.clear();
        }
        entries.entry(pattern.to_string()).or_insert(entry).clone()
    }
}

/// Validates patterns against the compiler and the ReDoS heuristics.
#[derive(Debug, Clone, Default)]
pub struct PatternValidator {
    cache: PatternCache,
}

impl PatternValidator {
    /// Creates a validator with its own, fresh cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator backed by an existing cache.
    pub fn with_cache(cache: PatternCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &PatternCache {
        &self.cache
    }

    /// Validates a pattern, discarding the compiled form.
    pub fn validate(&self, pattern: &str) -> Result<(), MaskingError> {
        self.compile(pattern).map(|_| ())
    }

    /// Returns `true` when `pattern` would be accepted.
    pub fn is_valid(&self, pattern: &str) -> bool {
        self.validate(pattern).is_ok()
    }

    /// Gets a compiled pattern from the cache or validates and compiles it.
    ///
    /// Rejections are cached as well, so a bad pattern is only analysed once.
    pub fn compile(&self, pattern: &str) -> Result<Arc<Regex>, MaskingError> {
        if let Some(entry) = self.cache.get(pattern) {
            debug!("Serving pattern '{}' from cache.", pattern);
            return entry.into_result();
        }

        let entry = match check_pattern(pattern) {
            Ok(regex) => {
                debug!("Pattern '{}' compiled successfully.", pattern);
                CacheEntry::Valid(Arc::new(regex))
            }
            Err(e) => {
                warn!("Rejected pattern: {}", e);
                CacheEntry::Rejected(e)
            }
        };
        self.cache.insert(pattern, entry).into_result()
    }

    /// Validates every pattern, returning the first failure.
    pub fn validate_all<'a, I>(&self, patterns: I) -> Result<(), MaskingError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for pattern in patterns {
            self.validate(pattern)?;
        }
        Ok(())
    }
}

fn check_pattern(pattern: &str) -> Result<Regex, MaskingError> {
    if pattern.is_empty() {
        return Err(MaskingError::invalid_pattern(pattern, PatternErrorKind::Empty, "pattern is empty"));
    }
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(MaskingError::invalid_pattern(
            pattern,
            PatternErrorKind::TooLong,
            format!("pattern length ({}) exceeds maximum allowed ({})", pattern.len(), MAX_PATTERN_LENGTH),
        ));
    }

    // Heuristics run first: a risky shape is rejected even if it compiles.
    if let Some((kind, detail)) = detect_backtracking_risk(pattern) {
        return Err(MaskingError::invalid_pattern(pattern, kind, detail));
    }

    let regex = RegexBuilder::new(pattern)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| MaskingError::invalid_pattern(pattern, PatternErrorKind::Compile, e.to_string()))?;

    // Exercise the automaton once so lazy construction errors surface here.
    let _ = regex.is_match("");
    Ok(regex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn rejection(p: &str) -> PatternErrorKind {
        match PatternValidator::new().validate(p) {
            Err(MaskingError::InvalidPattern { kind, .. }) => kind,
            other => panic!("expected rejection for {p}, got {other:?}"),
        }
    }

    #[test]
    fn test_redos_patterns_rejected() {
        assert!(rejection("(a+)+$").is_redos());
        assert!(rejection("(a*)*").is_redos());
        assert!(rejection("(x+){2,5}").is_redos());
    }

    #[test]
    fn test_safe_pattern_accepted() {
        let validator = PatternValidator::new();
        assert!(validator.is_valid(r"^[a-z]+@[a-z]+\.[a-z]{2,}$"));
        assert!(validator.is_valid(r"\b(\d{1,3}\.){3}\d{1,3}\b"));
        assert!(validator.is_valid(r"(?:\d{3}-)+\d{4}"));
    }

    #[test]
    fn test_compile_error_surfaces_engine_message() {
        assert_eq!(rejection("[unclosed"), PatternErrorKind::Compile);
        assert_eq!(rejection(""), PatternErrorKind::Empty);
        assert_eq!(rejection(&"a".repeat(MAX_PATTERN_LENGTH + 1)), PatternErrorKind::TooLong);
    }

    #[test]
    fn test_cache_shared_between_validators() {
        let cache = PatternCache::new();
        let a = PatternValidator::with_cache(cache.clone());
        let b = PatternValidator::with_cache(cache.clone());
        let first = a.compile(r"\d+").unwrap();
        let second = b.compile(r"\d+").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let _ = a.validate("(a+)+");
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_validation_yields_single_entry() {
        let validator = PatternValidator::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let v = validator.clone();
                thread::spawn(move || v.compile(r"[A-Z]{2}\d{6}").unwrap())
            })
            .collect();
        let compiled: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(compiled.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(validator.cache().len(), 1);
    }
}
