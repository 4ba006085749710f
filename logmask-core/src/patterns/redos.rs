//! redos.rs - Static heuristics for catastrophic-backtracking shapes.
//!
//! The scanner walks the pattern once, tracking group nesting, and flags
//! three shapes: a quantified group that already contains an unbounded
//! quantifier (`(a+)+`), the same under a bounded repetition (`(x+){2,5}`), and a
//! quantified group whose alternatives repeat each other (`(a|a)*`).
//! It does not try to be a full regex parser; malformed input is left for
//! the compiler to report.
//!
//! License: MIT OR APACHE 2.0

use std::collections::HashSet;

use crate::errors::PatternErrorKind;

/// Upper bound accepted for `{n,m}` on a group, regardless of its contents.
pub const MAX_BOUNDED_REPETITION: u32 = 1000;

#[derive(Debug, Default)]
struct GroupFrame {
    start: usize,
    quantified_inside: bool,
    alternatives: Vec<String>,
    current: String,
}

#[derive(Debug, Clone, Copy)]
struct Quantifier {
    repeats: bool,
    bounded: bool,
    upper: Option<u32>,
    end: usize,
}

/// Returns the classification and a short description of the first risky
/// shape found, or `None` if the pattern looks safe.
pub fn detect_backtracking_risk(pattern: &str) -> Option<(PatternErrorKind, String)> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut stack: Vec<GroupFrame> = vec![GroupFrame::default()];
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let end = (i + 2).min(chars.len());
                push_text(&mut stack, &chars[i..end]);
                i = end;
            }
            '[' => {
                let end = skip_class(&chars, i);
                push_text(&mut stack, &chars[i..end]);
                i = end;
            }
            '(' => {
                let (content_start, opens_group) = skip_group_prefix(&chars, i);
                if opens_group {
                    stack.push(GroupFrame { start: i, ..Default::default() });
                }
                i = content_start;
            }
            ')' => {
                if stack.len() == 1 {
                    // Unbalanced; the compiler reports it.
                    i += 1;
                    continue;
                }
                let Some(mut frame) = stack.pop() else { break };
                let current = std::mem::take(&mut frame.current);
                frame.alternatives.push(current);

                let quantifier = parse_quantifier(&chars, i + 1);
                let end = quantifier.map_or(i + 1, |q| q.end);
                let group_text: String = chars[frame.start..end].iter().collect();

                if let Some(q) = quantifier.filter(|q| q.repeats) {
                    if frame.quantified_inside {
                        let kind = if q.bounded {
                            PatternErrorKind::QuantifiedRepetition
                        } else {
                            PatternErrorKind::NestedQuantifier
                        };
                        return Some((kind, format!("quantified group '{}' contains a quantifier", group_text)));
                    }
                    if q.upper.is_some_and(|upper| upper > MAX_BOUNDED_REPETITION) {
                        return Some((
                            PatternErrorKind::QuantifiedRepetition,
                            format!("group '{}' repeats more than {} times", group_text, MAX_BOUNDED_REPETITION),
                        ));
                    }
                    if has_repeated_alternative(&frame.alternatives) {
                        return Some((
                            PatternErrorKind::RepeatedAlternation,
                            format!("quantified group '{}' repeats an alternative", group_text),
                        ));
                    }
                }

                if let Some(parent) = stack.last_mut() {
                    parent.quantified_inside |= frame.quantified_inside || quantifier.is_some_and(|q| q.unbounded());
                    parent.current.push_str(&group_text);
                }
                i = end;
            }
            '|' => {
                if let Some(top) = stack.last_mut() {
                    let current = std::mem::take(&mut top.current);
                    top.alternatives.push(current);
                }
                i += 1;
            }
            '*' | '+' | '?' | '{' => match parse_quantifier(&chars, i) {
                Some(q) => {
                    push_text(&mut stack, &chars[i..q.end]);
                    if let Some(top) = stack.last_mut() {
                        top.quantified_inside |= q.unbounded();
                    }
                    i = q.end;
                }
                None => {
                    push_text(&mut stack, &chars[i..i + 1]);
                    i += 1;
                }
            },
            _ => {
                push_text(&mut stack, &chars[i..i + 1]);
                i += 1;
            }
        }
    }

    None
}

fn push_text(stack: &mut [GroupFrame], text: &[char]) {
    if let Some(top) = stack.last_mut() {
        top.current.extend(text.iter());
    }
}

fn has_repeated_alternative(alternatives: &[String]) -> bool {
    if alternatives.len() < 2 {
        return false;
    }
    let mut seen = HashSet::with_capacity(alternatives.len());
    alternatives.iter().any(|alt| !seen.insert(alt.as_str()))
}

/// Skips a character class starting at `start` (which holds `[`), returning
/// the index just past its closing bracket.
fn skip_class(chars: &[char], start: usize) -> usize {
    let mut j = start + 1;
    if chars.get(j) == Some(&'^') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    let mut depth = 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            '[' => {
                depth += 1;
                j += 1;
            }
            ']' => {
                depth -= 1;
                j += 1;
                if depth == 0 {
                    return j;
                }
            }
            _ => j += 1,
        }
    }
    chars.len()
}

/// Handles `(?:`, `(?i)`, `(?i:`, `(?P<name>` and `(?<name>`. Returns the
/// index where group content begins and whether a capturing scope opened.
fn skip_group_prefix(chars: &[char], open: usize) -> (usize, bool) {
    if chars.get(open + 1) != Some(&'?') {
        return (open + 1, true);
    }
    let mut j = open + 2;
    if matches!(chars.get(j), Some('P') | Some('<')) {
        while j < chars.len() && chars[j] != '>' {
            j += 1;
        }
        return ((j + 1).min(chars.len()), true);
    }
    while j < chars.len() {
        match chars[j] {
            ':' => return (j + 1, true),
            // Flag-only group such as `(?i)`.
            ')' => return (j + 1, false),
            _ => j += 1,
        }
    }
    (chars.len(), false)
}

impl Quantifier {
    /// `*`, `+` and `{n,}`. Only these make an enclosing repeat ambiguous.
    fn unbounded(&self) -> bool {
        self.upper.is_none()
    }
}

fn parse_quantifier(chars: &[char], at: usize) -> Option<Quantifier> {
    let q = match chars.get(at)? {
        '*' | '+' => Quantifier { repeats: true, bounded: false, upper: None, end: at + 1 },
        '?' => Quantifier { repeats: false, bounded: false, upper: Some(1), end: at + 1 },
        '{' => parse_braces(chars, at)?,
        _ => return None,
    };
    // Lazy modifier.
    let end = if chars.get(q.end) == Some(&'?') { q.end + 1 } else { q.end };
    Some(Quantifier { end, ..q })
}

fn parse_braces(chars: &[char], open: usize) -> Option<Quantifier> {
    let mut j = open + 1;
    let lower = read_number(chars, &mut j)?;
    let (upper, has_comma) = match chars.get(j)? {
        '}' => (Some(lower), false),
        ',' => {
            j += 1;
            if chars.get(j) == Some(&'}') {
                (None, true)
            } else {
                (Some(read_number(chars, &mut j)?), true)
            }
        }
        _ => return None,
    };
    if chars.get(j) != Some(&'}') {
        return None;
    }
    let repeats = upper.map_or(true, |u| u > 1);
    Some(Quantifier {
        repeats,
        bounded: has_comma && upper.is_some() || !has_comma,
        upper,
        end: j + 1,
    })
}

fn read_number(chars: &[char], j: &mut usize) -> Option<u32> {
    let start = *j;
    while *j < chars.len() && chars[*j].is_ascii_digit() {
        *j += 1;
    }
    if *j == start {
        return None;
    }
    chars[start..*j].iter().collect::<String>().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(p: &str) -> Option<PatternErrorKind> {
        detect_backtracking_risk(p).map(|(k, _)| k)
    }

    #[test]
    fn test_nested_quantifiers_are_flagged() {
        assert_eq!(kind("(a+)+$"), Some(PatternErrorKind::NestedQuantifier));
        assert_eq!(kind("(a*)*"), Some(PatternErrorKind::NestedQuantifier));
        assert_eq!(kind("^(?:\\d+)*x"), Some(PatternErrorKind::NestedQuantifier));
        assert_eq!(kind("((ab)+c)+"), Some(PatternErrorKind::NestedQuantifier));
    }

    #[test]
    fn test_bounded_repetition_of_quantified_group() {
        assert_eq!(kind("(x+){2,5}"), Some(PatternErrorKind::QuantifiedRepetition));
        assert_eq!(kind("(ab){1,5000}"), Some(PatternErrorKind::QuantifiedRepetition));
    }

    #[test]
    fn test_repeated_alternation() {
        assert_eq!(kind("(a|a|a)*"), Some(PatternErrorKind::RepeatedAlternation));
        assert_eq!(kind("(foo|bar)+"), None);
    }

    #[test]
    fn test_safe_patterns_pass() {
        assert_eq!(kind(r"^[a-z]+@[a-z]+\.[a-z]{2,}$"), None);
        assert_eq!(kind(r"\d{3}-\d{2}-\d{4}"), None);
        assert_eq!(kind(r"(?i)bearer\s+[a-z0-9._-]+"), None);
        assert_eq!(kind(r"(\d{3})-(\d{4})"), None);
        assert_eq!(kind(r"[(+*)]+"), None);
        assert_eq!(kind(r"\(a+\)+"), None);
        assert_eq!(kind(r"(?:\+?1[-. ]?)?\d{3}"), None);
    }

    #[test]
    fn test_bounded_inner_quantifiers_pass() {
        assert_eq!(kind(r"(\d{1,3}\.){3}\d{1,3}"), None);
        assert_eq!(kind(r"(?:\d{3}-)+\d{4}"), None);
        assert_eq!(kind(r"(?:[a-f0-9]{2}:){5}[a-f0-9]{2}"), None);
        assert_eq!(kind(r"(-?\d)+"), None);
        assert_eq!(kind(r"((ab){2})+"), None);
        assert_eq!(kind(r"(\d{2,})+"), Some(PatternErrorKind::NestedQuantifier));
    }
}
