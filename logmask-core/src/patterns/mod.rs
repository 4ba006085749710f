//! Pattern validation, compilation and ordered application.
//!
//! `validator` owns the compile-and-cache path, `redos` holds the static
//! backtracking heuristics, and [`PatternSet`] is the ordered list of
//! `(regex, replacement)` pairs used for both message masking and the regex
//! strategy.

pub mod redos;
pub mod validator;

use std::borrow::Cow;
use std::sync::Arc;

use log::debug;
use regex::Regex;

use crate::errors::MaskingError;
pub use validator::{PatternCache, PatternValidator, MAX_CACHE_ENTRIES, MAX_PATTERN_LENGTH};

/// A single validated pattern with its replacement text.
///
/// Replacements follow the `regex` crate expansion syntax (`$1`, `${name}`).
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub pattern: String,
    pub regex: Arc<Regex>,
    pub replacement: String,
}

/// An ordered set of compiled patterns applied one after another.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    entries: Vec<CompiledPattern>,
}

impl PatternSet {
    /// Validates and compiles `(pattern, replacement)` pairs in order.
    pub fn compile<I, K, V>(validator: &PatternValidator, pairs: I) -> Result<Self, MaskingError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut entries = Vec::new();
        for (pattern, replacement) in pairs {
            let pattern = pattern.as_ref();
            let regex = validator.compile(pattern)?;
            entries.push(CompiledPattern {
                pattern: pattern.to_string(),
                regex,
                replacement: replacement.into(),
            });
        }
        debug!("Compiled pattern set with {} entries.", entries.len());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledPattern> {
        self.entries.iter()
    }

    /// Returns `true` if any pattern matches `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.entries.iter().any(|p| p.regex.is_match(text))
    }

    /// Substitutes every match of every pattern, in order. Borrows the
    /// input when nothing matched.
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out: Cow<'a, str> = Cow::Borrowed(text);
        for entry in &self.entries {
            let replaced = match entry.regex.replace_all(&out, entry.replacement.as_str()) {
                Cow::Owned(s) => Some(s),
                Cow::Borrowed(_) => None,
            };
            if let Some(s) = replaced {
                out = Cow::Owned(s);
            }
        }
        out
    }
}
