//! # smwmerge-engine
//!
//! Format-agnostic line merging used by the SIMPL Windows merge tool.
//!
//! ## Pieces
//!
//! 1. **Sequence differ** ([`differ`]): a lazy, minimal-edit alignment of
//!    two line lists built on the `similar` crate.
//! 2. **Two-way merge** ([`two_way`]): the ordered union of two lists.
//! 3. **Three-way merge** ([`three_way`]): walks the base→A and base→B
//!    alignments side by side and hands every divergence to a policy.
//! 4. **Policies** ([`policy`]): diff3-style markers, conservative, greedy
//!    and highest-value-wins, plus the [`MergePolicy`] trait that
//!    record-aware policies implement.
//!
//! ## Example
//!
//! ```rust
//! use smwmerge_engine::{three_way, Greedy, MergeScenario};
//!
//! let base = ["a", "b"];
//! let a = ["a", "x", "b"];
//! let b = ["a", "y", "b"];
//! let outcome = three_way(&MergeScenario::new(&base[..], &a[..], &b[..]), &Greedy);
//!
//! assert!(!outcome.conflicted);
//! assert_eq!(outcome.lines, vec!["a", "x", "y", "b"]);
//! ```

pub mod differ;
pub mod merge;
pub mod policy;
pub mod types;

pub use differ::{align, diff_lines, LineDiff};
pub use merge::{three_way, two_way};
pub use policy::{
    diff3_markers, Conservative, Diff3, Greedy, MaxKeys, MergePolicy, ValueOrdering, CRLF,
};
pub use types::{
    Conflict, EditTag, LineEdit, MergeOutcome, MergeScenario, Resolution, Side, StepTags,
};
