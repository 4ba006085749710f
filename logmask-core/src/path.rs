//! path.rs - Dot-notation field paths and wildcard matching.
//!
//! A path addresses a value inside the context: `user.address.zip`, with
//! sequence elements addressed by index (`items.0.name`). Path patterns may
//! contain `*`, which matches any run of characters including dots, so
//! `user.*` covers `user.email` as well as `user.address.zip`.

use crate::errors::MaskingError;

/// Joins a parent path and a child key.
pub fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        let mut path = String::with_capacity(parent.len() + key.len() + 1);
        path.push_str(parent);
        path.push('.');
        path.push_str(key);
        path
    }
}

pub fn is_wildcard(pattern: &str) -> bool {
    pattern.contains('*')
}

/// Glob-style match where `*` matches zero or more characters.
pub fn wildcard_match(pattern: &str, path: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = path.chars().collect();
    let (mut pi, mut si) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while si < s.len() {
        if pi < p.len() && p[pi] != '*' && p[pi] == s[si] {
            pi += 1;
            si += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            resume = si;
            pi += 1;
        } else if let Some(star_at) = star {
            pi = star_at + 1;
            resume += 1;
            si = resume;
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

/// Matches either exactly or, for wildcard patterns, by glob.
pub fn matches(pattern: &str, path: &str) -> bool {
    if is_wildcard(pattern) {
        wildcard_match(pattern, path)
    } else {
        pattern == path
    }
}

/// Rejects empty paths and empty segments such as `user..email`.
pub fn validate(path: &str) -> Result<(), MaskingError> {
    if path.trim().is_empty() {
        return Err(MaskingError::InvalidConfiguration("field path cannot be empty".to_string()));
    }
    if path.split('.').any(|segment| segment.is_empty()) {
        return Err(MaskingError::InvalidConfiguration(format!(
            "field path '{}' contains an empty segment",
            path
        )));
    }
    Ok(())
}

/// Ordering key for wildcard patterns: more literal characters first, then
/// fewer wildcards.
pub fn specificity(pattern: &str) -> (usize, std::cmp::Reverse<usize>) {
    let stars = pattern.matches('*').count();
    (pattern.len() - stars, std::cmp::Reverse(stars))
}
