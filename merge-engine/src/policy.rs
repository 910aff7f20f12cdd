//! Conflict policies.
//!
//! A policy is a value implementing the three capabilities the merge walk
//! calls into: conflict resolution, the last-ditch merge of two competing
//! lines, and preprocessing of lines added by one side. Every capability has a
//! default, so concrete policies override only what they need and compose by
//! wrapping one another instead of inheriting.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::merge::two_way;
use crate::types::{Conflict, Resolution, Side};

/// Line terminator used when a policy splits a line into sub-lines.
pub const CRLF: &str = "\r\n";

/// Capabilities consulted by [`two_way`] and [`three_way`](crate::three_way).
pub trait MergePolicy {
    /// Resolve a conflicting span. Defaults to diff3-style markers.
    fn resolve_conflict(&self, conflict: Conflict) -> Resolution {
        diff3_markers(conflict)
    }

    /// Try to synthesize one line from two competing added lines.
    fn last_ditch(&self, _a: &str, _b: &str) -> Option<String> {
        None
    }

    /// Rewrite a line contributed by `side` before it enters the result.
    fn preprocess_added(&self, line: &str, _side: Side) -> String {
        line.to_string()
    }
}

impl<P: MergePolicy + ?Sized> MergePolicy for &P {
    fn resolve_conflict(&self, conflict: Conflict) -> Resolution {
        (**self).resolve_conflict(conflict)
    }

    fn last_ditch(&self, a: &str, b: &str) -> Option<String> {
        (**self).last_ditch(a, b)
    }

    fn preprocess_added(&self, line: &str, side: Side) -> String {
        (**self).preprocess_added(line, side)
    }
}

impl<P: MergePolicy + ?Sized> MergePolicy for Box<P> {
    fn resolve_conflict(&self, conflict: Conflict) -> Resolution {
        (**self).resolve_conflict(conflict)
    }

    fn last_ditch(&self, a: &str, b: &str) -> Option<String> {
        (**self).last_ditch(a, b)
    }

    fn preprocess_added(&self, line: &str, side: Side) -> String {
        (**self).preprocess_added(line, side)
    }
}

/// Wrap both spans in conflict markers and report the span as unresolved.
pub fn diff3_markers(conflict: Conflict) -> Resolution {
    let mut lines = Vec::with_capacity(conflict.a.len() + conflict.b.len() + 3);
    lines.push(format!("<<<<<<< {}", Side::A));
    lines.extend(conflict.a);
    lines.push("=======".to_string());
    lines.extend(conflict.b);
    lines.push(format!(">>>>>>> {}", Side::B));
    Resolution::unresolved(lines)
}

// ──────────────────────────────────────────────────────────────
// Generic policies
// ──────────────────────────────────────────────────────────────

/// Leave every conflict for manual resolution, marked up like GNU diff3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Diff3;

impl MergePolicy for Diff3 {}

/// Keep B's span and discard A's.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conservative;

impl MergePolicy for Conservative {
    fn resolve_conflict(&self, conflict: Conflict) -> Resolution {
        Resolution::resolved(conflict.b)
    }
}

/// Keep both spans, A's first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Greedy;

impl MergePolicy for Greedy {
    fn resolve_conflict(&self, conflict: Conflict) -> Resolution {
        let mut lines = conflict.a;
        lines.extend(conflict.b);
        Resolution::resolved(lines)
    }
}

/// How two values of the same key are compared by [`MaxKeys`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrdering {
    /// Byte-wise string comparison.
    Lexicographic,
    /// Compare as numbers; falls back to lexicographic if either value is
    /// not a number.
    Numeric,
}

impl ValueOrdering {
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        if self == ValueOrdering::Numeric {
            if let (Ok(x), Ok(y)) = (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
                if let Some(ord) = x.partial_cmp(&y) {
                    return ord;
                }
            }
        }
        a.cmp(b)
    }
}

/// Highest value wins.
///
/// Merges both sides line by line as `key=value` entries, then collapses
/// every run of consecutive entries sharing a key down to the one with the
/// greatest value. Never leaves a conflict behind.
#[derive(Debug, Clone)]
pub struct MaxKeys {
    numeric_keys: BTreeSet<String>,
    separator: String,
}

impl Default for MaxKeys {
    fn default() -> Self {
        Self {
            numeric_keys: BTreeSet::new(),
            separator: CRLF.to_string(),
        }
    }
}

impl MaxKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the values of these keys numerically.
    pub fn with_numeric_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.numeric_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Separator used to split a line into `key=value` entries in
    /// [`MergePolicy::last_ditch`].
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn ordering_for(&self, key: &str) -> ValueOrdering {
        if self.numeric_keys.contains(key) {
            ValueOrdering::Numeric
        } else {
            ValueOrdering::Lexicographic
        }
    }

    /// Collapse runs of same-key entries to the greatest value.
    pub fn collapse(&self, lines: Vec<String>) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        for line in lines {
            let Some((key, value)) = line.split_once('=') else {
                out.push(line);
                continue;
            };
            let replace = match out.last().and_then(|kept| kept.split_once('=')) {
                Some((kept_key, kept_value)) if kept_key == key => Some(
                    self.ordering_for(key).compare(value, kept_value) == Ordering::Greater,
                ),
                _ => None,
            };
            match replace {
                Some(true) => {
                    if let Some(kept) = out.last_mut() {
                        *kept = line;
                    }
                }
                Some(false) => {}
                None => out.push(line),
            }
        }
        out
    }
}

impl MergePolicy for MaxKeys {
    fn resolve_conflict(&self, conflict: Conflict) -> Resolution {
        let merged = two_way(&conflict.a, &conflict.b, &Diff3);
        Resolution::resolved(self.collapse(merged))
    }

    fn last_ditch(&self, a: &str, b: &str) -> Option<String> {
        let a: Vec<&str> = a.split(self.separator.as_str()).collect();
        let b: Vec<&str> = b.split(self.separator.as_str()).collect();
        let merged = two_way(&a, &b, &Diff3);
        Some(self.collapse(merged).join(&self.separator))
    }
}
