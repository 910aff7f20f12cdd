//! Core types for the merge engine.
//!
//! Everything here is line-oriented: a "line" is an opaque string that the
//! engine compares for equality only. Record-aware behaviour lives behind the
//! [`MergePolicy`](crate::policy::MergePolicy) hooks.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of one aligned line produced by the differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditTag {
    /// Present on both sides.
    Same,
    /// Present only on the left (old) side.
    Removed,
    /// Present only on the right (new) side.
    Added,
    /// Intra-line change guide. Informational only; every consumer drops it.
    Hint,
}

impl EditTag {
    /// The two-character prefix used when rendering an edit script.
    pub fn marker(self) -> &'static str {
        match self {
            EditTag::Same => "  ",
            EditTag::Removed => "- ",
            EditTag::Added => "+ ",
            EditTag::Hint => "? ",
        }
    }
}

/// One tagged line of an alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEdit<'a> {
    pub tag: EditTag,
    pub text: Cow<'a, str>,
}

impl<'a> LineEdit<'a> {
    pub fn new(tag: EditTag, text: impl Into<Cow<'a, str>>) -> Self {
        Self {
            tag,
            text: text.into(),
        }
    }

    pub fn is_hint(&self) -> bool {
        self.tag == EditTag::Hint
    }
}

impl fmt::Display for LineEdit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.tag.marker(), self.text)
    }
}

/// One of the two derivatives being merged against a common ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

impl Side {
    /// Display name, also used as the key suffix for side-tagged lines.
    pub fn name(self) -> &'static str {
        match self {
            Side::A => "A",
            Side::B => "B",
        }
    }

    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    /// Parse a key suffix (`A` or `B`).
    pub fn from_suffix(suffix: &str) -> Option<Side> {
        match suffix {
            "A" => Some(Side::A),
            "B" => Some(Side::B),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The three-way merge scenario: common ancestor plus both derivatives.
#[derive(Debug, Clone)]
pub struct MergeScenario<T> {
    pub base: T,
    pub a: T,
    pub b: T,
}

impl<T> MergeScenario<T> {
    pub fn new(base: T, a: T, b: T) -> Self {
        Self { base, a, b }
    }
}

/// The tags of the alignment step preceding a conflict, one per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTags {
    pub a: EditTag,
    pub b: EditTag,
}

impl StepTags {
    /// Both sides dropped the same base line on this step.
    pub fn both_removed(&self) -> bool {
        self.a == EditTag::Removed && self.b == EditTag::Removed
    }
}

/// Competing spans handed to a conflict policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Added lines from side A, already passed through `preprocess_added`.
    pub a: Vec<String>,
    /// Added lines from side B, already passed through `preprocess_added`.
    pub b: Vec<String>,
    /// Tags of the alignment step before the conflict; `None` at the start.
    pub previous: Option<StepTags>,
}

/// What a conflict policy decided for one conflicting span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub resolved: bool,
    pub lines: Vec<String>,
}

impl Resolution {
    pub fn resolved(lines: Vec<String>) -> Self {
        Self {
            resolved: true,
            lines,
        }
    }

    pub fn unresolved(lines: Vec<String>) -> Self {
        Self {
            resolved: false,
            lines,
        }
    }
}

/// Result of a three-way merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// True if any conflicting span was left unresolved by the policy.
    pub conflicted: bool,
    pub lines: Vec<String>,
}
