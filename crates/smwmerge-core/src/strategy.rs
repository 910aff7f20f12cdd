//! Record-aware merge policies and the per-type strategy table.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use smwmerge_engine::{
    two_way, Conflict, Conservative, Diff3, Greedy, MaxKeys, MergePolicy, Resolution, Side,
};
use tracing::{debug, error};

use crate::record::{Record, RecordKind, NEWLINE};

/// Reference keys: up to three characters followed by `H`.
static REF_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([^=\r\n]{0,3}H)=").expect("Invalid regex pattern"));

/// Ordinal child keys `C1` through `C9999`.
static CHILD_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(C[0-9]{1,4})=").expect("Invalid regex pattern"));

/// Suffix every reference and child key in `text` with the contributing side,
/// e.g. `PrH=5` becomes `PrH-A=5`.
pub fn tag_side(text: &str, side: Side) -> String {
    let replacement = format!("${{1}}-{side}=");
    let tagged = REF_KEY.replace_all(text, replacement.as_str());
    CHILD_KEY
        .replace_all(&tagged, replacement.as_str())
        .into_owned()
}

// ──────────────────────────────────────────────────────────────
// Record-aware wrapper
// ──────────────────────────────────────────────────────────────

/// Adds record awareness to a generic policy.
///
/// Lines added by one side get their references tagged with that side, and
/// two competing records are merged entry by entry, keeping the result only
/// if it still parses as a record.
#[derive(Debug, Clone, Default)]
pub struct RecordAware<P> {
    inner: P,
}

impl<P> RecordAware<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: MergePolicy> MergePolicy for RecordAware<P> {
    fn resolve_conflict(&self, conflict: Conflict) -> Resolution {
        self.inner.resolve_conflict(conflict)
    }

    fn last_ditch(&self, a: &str, b: &str) -> Option<String> {
        let a: Vec<&str> = a.split(NEWLINE).collect();
        let b: Vec<&str> = b.split(NEWLINE).collect();
        let merged = two_way(&a, &b, self).join(NEWLINE);
        match Record::parse(&merged) {
            Ok(_) => Some(merged),
            Err(e) => {
                debug!(error = %e, "record-level merge rejected");
                None
            }
        }
    }

    fn preprocess_added(&self, line: &str, side: Side) -> String {
        tag_side(line, side)
    }
}

// ──────────────────────────────────────────────────────────────
// Symbols
// ──────────────────────────────────────────────────────────────

/// Receives conflicts the merge cannot settle on its own.
pub trait ConflictReporter {
    fn unhandled_conflict(&self, conflict: &Conflict);
}

/// Reports conflicts through the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ConflictReporter for LogReporter {
    fn unhandled_conflict(&self, conflict: &Conflict) {
        error!(
            a = conflict.a.len(),
            b = conflict.b.len(),
            "unhandled merge conflict in the symbol library; resulting program will be incomplete"
        );
        for line in &conflict.a {
            debug!(side = "A", "{line}");
        }
        for line in &conflict.b {
            debug!(side = "B", "{line}");
        }
    }
}

/// Conflict handling for the symbol hierarchy.
///
/// Diverging additions are kept from both sides. A divergence right after
/// both sides removed the same symbol is a restructuring of the hierarchy
/// that cannot be combined safely: it is reported and left out.
pub struct SymbolConflicts<'r> {
    reporter: &'r dyn ConflictReporter,
}

impl<'r> SymbolConflicts<'r> {
    pub fn new(reporter: &'r dyn ConflictReporter) -> Self {
        Self { reporter }
    }
}

impl MergePolicy for SymbolConflicts<'_> {
    fn resolve_conflict(&self, conflict: Conflict) -> Resolution {
        debug!(
            a = conflict.a.len(),
            b = conflict.b.len(),
            previous = ?conflict.previous,
            "symbol conflict"
        );
        if !conflict.previous.is_some_and(|tags| tags.both_removed()) {
            let mut lines = conflict.a;
            lines.extend(conflict.b);
            return Resolution::resolved(lines);
        }
        self.reporter.unhandled_conflict(&conflict);
        Resolution::unresolved(Vec::new())
    }
}

// ──────────────────────────────────────────────────────────────
// Strategy table
// ──────────────────────────────────────────────────────────────

/// Named merge strategies, as used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Diff3,
    Conservative,
    Greedy,
    MaxKeys,
    RecordConservative,
    RecordGreedy,
    Symbols,
    /// Take the primary side's records without merging.
    NoMerge,
}

impl StrategyKind {
    /// Built-in choice for a record type.
    pub fn default_for(kind: &RecordKind) -> Self {
        match kind {
            RecordKind::Unknown(code) if code.is_empty() => StrategyKind::Conservative,
            RecordKind::Symbol => StrategyKind::Symbols,
            RecordKind::Signal => StrategyKind::RecordGreedy,
            RecordKind::ProgramInfo => StrategyKind::MaxKeys,
            RecordKind::OpenSymbol => StrategyKind::NoMerge,
            RecordKind::Header
            | RecordKind::FloatTable
            | RecordKind::Bank
            | RecordKind::Device
            | RecordKind::CresnetConfig
            | RecordKind::CentralController
            | RecordKind::Unknown(_) => StrategyKind::RecordConservative,
        }
    }
}

/// Strategy per record type: the built-in table plus configured overrides.
#[derive(Debug, Clone, Default)]
pub struct StrategyTable {
    overrides: BTreeMap<String, StrategyKind>,
    numeric_keys: Vec<String>,
}

impl StrategyTable {
    pub fn new(overrides: BTreeMap<String, StrategyKind>, numeric_keys: Vec<String>) -> Self {
        Self {
            overrides,
            numeric_keys,
        }
    }

    pub fn is_overridden(&self, kind: &RecordKind) -> bool {
        self.overrides.contains_key(kind.code())
    }

    pub fn strategy_for(&self, kind: &RecordKind) -> StrategyKind {
        self.overrides
            .get(kind.code())
            .copied()
            .unwrap_or_else(|| StrategyKind::default_for(kind))
    }

    /// Build the policy for `kind`, or `None` if it is not merged at all.
    pub fn policy_for<'r>(
        &self,
        kind: &RecordKind,
        reporter: &'r dyn ConflictReporter,
    ) -> Option<Box<dyn MergePolicy + 'r>> {
        let policy: Box<dyn MergePolicy + 'r> = match self.strategy_for(kind) {
            StrategyKind::Diff3 => Box::new(Diff3),
            StrategyKind::Conservative => Box::new(Conservative),
            StrategyKind::Greedy => Box::new(Greedy),
            StrategyKind::MaxKeys => {
                Box::new(MaxKeys::new().with_numeric_keys(self.numeric_keys.iter().cloned()))
            }
            StrategyKind::RecordConservative => Box::new(RecordAware::new(Conservative)),
            StrategyKind::RecordGreedy => Box::new(RecordAware::new(Greedy)),
            StrategyKind::Symbols => Box::new(RecordAware::new(SymbolConflicts::new(reporter))),
            StrategyKind::NoMerge => return None,
        };
        Some(policy)
    }
}
