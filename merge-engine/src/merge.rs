//! Two-way and three-way line merges.
//!
//! The three-way walk follows the classic approach of aligning each
//! derivative against the common ancestor and stepping through both edit
//! scripts with independent cursors. Every base line appears exactly once in
//! each script (as `Same` or `Removed`), so the cursors stay in step with
//! respect to the base; only added lines let one cursor run ahead.

use tracing::debug;

use crate::differ::{align, diff_lines};
use crate::policy::MergePolicy;
use crate::types::{Conflict, EditTag, LineEdit, MergeOutcome, MergeScenario, Side, StepTags};

/// Union of two line lists, preserving relative order.
///
/// Lines only in `a` pass through `preprocess_added` tagged as side A, lines
/// only in `b` as side B. There is no notion of conflict at this level.
pub fn two_way<L, R, P>(a: &[L], b: &[R], policy: &P) -> Vec<String>
where
    L: AsRef<str>,
    R: AsRef<str>,
    P: MergePolicy + ?Sized,
{
    let mut merged = Vec::with_capacity(a.len().max(b.len()));
    for edit in diff_lines(a, b) {
        match edit.tag {
            EditTag::Same => merged.push(edit.text.into_owned()),
            EditTag::Removed => merged.push(policy.preprocess_added(&edit.text, Side::A)),
            EditTag::Added => merged.push(policy.preprocess_added(&edit.text, Side::B)),
            EditTag::Hint => {}
        }
    }
    merged
}

/// Merge `a` and `b`, both derived from `base`.
///
/// Divergences are first offered to [`MergePolicy::last_ditch`]; whatever it
/// declines is collected into a [`Conflict`] and handed to
/// [`MergePolicy::resolve_conflict`]. An unresolved span marks the outcome
/// as conflicted but never stops the walk.
pub fn three_way<S, P>(scenario: &MergeScenario<&[S]>, policy: &P) -> MergeOutcome
where
    S: AsRef<str>,
    P: MergePolicy + ?Sized,
{
    let script_a = align(scenario.base, scenario.a);
    let script_b = align(scenario.base, scenario.b);
    let mut ca = Cursor::new(&script_a);
    let mut cb = Cursor::new(&script_b);

    let mut outcome = MergeOutcome::default();
    let mut current: Option<StepTags> = None;

    while let (Some(ea), Some(eb)) = (ca.current(), cb.current()) {
        let previous = current;
        current = Some(StepTags {
            a: ea.tag,
            b: eb.tag,
        });

        // unchanged, or the same line added on both sides
        if ea == eb {
            match ea.tag {
                EditTag::Same => {
                    outcome.lines.push(ea.text.to_string());
                    ca.advance();
                    cb.advance();
                    continue;
                }
                EditTag::Added => {
                    outcome.lines.push(policy.preprocess_added(&ea.text, Side::A));
                    ca.advance();
                    cb.advance();
                    continue;
                }
                _ => {}
            }
        }

        // a base line removed by one or both sides stays removed
        let same_base_line = ea.tag != EditTag::Added && eb.tag != EditTag::Added;
        if same_base_line
            && ea.text == eb.text
            && (ea.tag == EditTag::Removed || eb.tag == EditTag::Removed)
        {
            ca.advance();
            cb.advance();
            continue;
        }

        match (ea.tag, eb.tag) {
            (EditTag::Added, EditTag::Same) => {
                outcome.lines.push(policy.preprocess_added(&ea.text, Side::A));
                ca.advance();
                continue;
            }
            (EditTag::Same, EditTag::Added) => {
                outcome.lines.push(policy.preprocess_added(&eb.text, Side::B));
                cb.advance();
                continue;
            }
            (EditTag::Added, EditTag::Added) => {
                if let Some(merged) = policy.last_ditch(&ea.text, &eb.text) {
                    debug!("last-ditch merge combined competing lines");
                    outcome.lines.push(merged);
                    ca.advance();
                    cb.advance();
                    continue;
                }
            }
            _ => {}
        }

        let conflict = collect_conflict(&mut ca, &mut cb, policy, previous);
        debug!(
            a = conflict.a.len(),
            b = conflict.b.len(),
            previous = ?conflict.previous,
            "conflicting span"
        );
        let resolution = policy.resolve_conflict(conflict);
        if !resolution.resolved {
            outcome.conflicted = true;
        }
        outcome.lines.extend(resolution.lines);
    }

    ca.drain_into(&mut outcome.lines, Side::A, policy);
    cb.drain_into(&mut outcome.lines, Side::B, policy);
    outcome
}

/// Gather the diverging runs of both sides into one conflict.
///
/// Each side contributes its contiguous run of non-`Same` edits: added lines
/// go into the span, removed lines are dropped. If one side removed base
/// lines the other kept, the kept copies are dropped too and collection
/// continues, so both cursors leave the conflict at the same base line. This
/// holds when one script runs out first: the other side still drops every
/// base line up to the end.
fn collect_conflict<P: MergePolicy + ?Sized>(
    ca: &mut Cursor<'_, '_>,
    cb: &mut Cursor<'_, '_>,
    policy: &P,
    previous: Option<StepTags>,
) -> Conflict {
    let start = (ca.pos, cb.pos);
    let mut a = Vec::new();
    let mut b = Vec::new();

    loop {
        ca.take_run(&mut a, Side::A, policy);
        cb.take_run(&mut b, Side::B, policy);
        match (ca.current(), cb.current()) {
            (Some(_), _) if ca.base < cb.base => ca.advance(),
            (_, Some(_)) if cb.base < ca.base => cb.advance(),
            _ => break,
        }
    }

    if (ca.pos, cb.pos) == start {
        // both sides sit on differing kept lines; take one line from each
        if let Some(e) = ca.current() {
            a.push(policy.preprocess_added(&e.text, Side::A));
            ca.advance();
        }
        if let Some(e) = cb.current() {
            b.push(policy.preprocess_added(&e.text, Side::B));
            cb.advance();
        }
    }

    Conflict { a, b, previous }
}

/// Position within one side's edit script.
struct Cursor<'e, 'a> {
    edits: &'e [LineEdit<'a>],
    pos: usize,
    /// Number of base lines consumed so far.
    base: usize,
}

impl<'e, 'a> Cursor<'e, 'a> {
    fn new(edits: &'e [LineEdit<'a>]) -> Self {
        Self {
            edits,
            pos: 0,
            base: 0,
        }
    }

    fn current(&self) -> Option<&'e LineEdit<'a>> {
        self.edits.get(self.pos)
    }

    fn advance(&mut self) {
        if let Some(edit) = self.current() {
            if matches!(edit.tag, EditTag::Same | EditTag::Removed) {
                self.base += 1;
            }
            self.pos += 1;
        }
    }

    fn take_run<P: MergePolicy + ?Sized>(&mut self, span: &mut Vec<String>, side: Side, policy: &P) {
        while let Some(edit) = self.current() {
            match edit.tag {
                EditTag::Same => break,
                EditTag::Added => span.push(policy.preprocess_added(&edit.text, side)),
                EditTag::Removed | EditTag::Hint => {}
            }
            self.advance();
        }
    }

    fn drain_into<P: MergePolicy + ?Sized>(&mut self, out: &mut Vec<String>, side: Side, policy: &P) {
        while let Some(edit) = self.current() {
            match edit.tag {
                EditTag::Same => out.push(edit.text.to_string()),
                EditTag::Added => out.push(policy.preprocess_added(&edit.text, side)),
                EditTag::Removed | EditTag::Hint => {}
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Conservative, Diff3, Greedy};
    use crate::types::Resolution;
    use proptest::prelude::*;
    use std::cell::RefCell;

    fn merge(base: &[&str], a: &[&str], b: &[&str]) -> MergeOutcome {
        three_way(&MergeScenario::new(base, a, b), &Diff3)
    }

    /// Suffixes added lines with their side, like the record-aware policies.
    struct Tagging;

    impl MergePolicy for Tagging {
        fn preprocess_added(&self, line: &str, side: Side) -> String {
            format!("{line}@{side}")
        }
    }

    /// Records what the conflict policy was handed.
    #[derive(Default)]
    struct Recording {
        seen: RefCell<Vec<Conflict>>,
    }

    impl MergePolicy for Recording {
        fn resolve_conflict(&self, conflict: Conflict) -> Resolution {
            self.seen.borrow_mut().push(conflict);
            Resolution::resolved(vec![])
        }
    }

    #[test]
    fn test_two_way_union_keeps_order() {
        let merged = two_way(&["a", "b", "d"], &["a", "c", "d"], &Diff3);
        assert_eq!(merged, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_two_way_tags_sides() {
        let merged = two_way(&["a", "x"], &["a", "y"], &Tagging);
        assert_eq!(merged, vec!["a", "x@A", "y@B"]);
    }

    #[test]
    fn test_no_changes() {
        let base = ["a", "b"];
        let out = merge(&base, &base, &base);
        assert!(!out.conflicted);
        assert_eq!(out.lines, vec!["a", "b"]);
    }

    #[test]
    fn test_independent_additions() {
        let out = merge(&["a", "b", "c"], &["a", "x", "b", "c"], &["a", "b", "c", "y"]);
        assert!(!out.conflicted);
        assert_eq!(out.lines, vec!["a", "x", "b", "c", "y"]);
    }

    #[test]
    fn test_deletion_wins_over_kept_line() {
        let out = merge(&["a", "b", "c"], &["a", "c"], &["a", "b", "c"]);
        assert!(!out.conflicted);
        assert_eq!(out.lines, vec!["a", "c"]);
    }

    #[test]
    fn test_identical_additions_emitted_once() {
        let out = merge(&["a"], &["a", "x"], &["a", "x"]);
        assert!(!out.conflicted);
        assert_eq!(out.lines, vec!["a", "x"]);
    }

    #[test]
    fn test_diverging_edits_conflict_with_markers() {
        let out = merge(&["a", "b", "c"], &["a", "x", "c"], &["a", "y", "c"]);
        assert!(out.conflicted);
        assert_eq!(
            out.lines,
            vec!["a", "<<<<<<< A", "x", "=======", "y", ">>>>>>> B", "c"]
        );
    }

    #[test]
    fn test_conservative_and_greedy_resolve() {
        let scenario = MergeScenario::new(
            &["a", "b", "c"][..],
            &["a", "x", "c"][..],
            &["a", "y", "c"][..],
        );
        let out = three_way(&scenario, &Conservative);
        assert!(!out.conflicted);
        assert_eq!(out.lines, vec!["a", "y", "c"]);

        let out = three_way(&scenario, &Greedy);
        assert!(!out.conflicted);
        assert_eq!(out.lines, vec!["a", "x", "y", "c"]);
    }

    #[test]
    fn test_previous_tags_reported_after_mutual_removal() {
        let policy = Recording::default();
        let scenario = MergeScenario::new(&["a", "b"][..], &["x", "b"][..], &["y", "b"][..]);
        let out = three_way(&scenario, &policy);
        assert!(!out.conflicted);
        assert_eq!(out.lines, vec!["b"]);
        let seen = policy.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].a, vec!["x"]);
        assert_eq!(seen[0].b, vec!["y"]);
        assert!(seen[0].previous.is_some_and(|t| t.both_removed()));
    }

    #[test]
    fn test_insert_against_deletion_resyncs() {
        // A inserts before "b", B deletes "b"
        let policy = Recording::default();
        let scenario = MergeScenario::new(
            &["a", "b", "c"][..],
            &["a", "x", "b", "c"][..],
            &["a", "c"][..],
        );
        let out = three_way(&scenario, &policy);
        assert_eq!(out.lines, vec!["a", "c"]);
        let seen = policy.seen.borrow();
        assert_eq!(seen[0].a, vec!["x"]);
        assert!(seen[0].b.is_empty());
    }

    #[test]
    fn test_deletion_wins_when_other_script_ends_first() {
        // A deletes everything, B inserts in front of the deleted line
        let scenario = MergeScenario::new(&["p"][..], &[][..], &["y", "p"][..]);
        assert_eq!(three_way(&scenario, &Greedy).lines, vec!["y"]);
        assert_eq!(three_way(&scenario, &Conservative).lines, vec!["y"]);

        let scenario = MergeScenario::new(&["p", "q"][..], &["x"][..], &["y", "p", "q"][..]);
        let out = three_way(&scenario, &Greedy);
        assert!(!out.conflicted);
        assert_eq!(out.lines, vec!["x", "y"]);
    }

    #[test]
    fn test_lagging_side_additions_join_the_span() {
        let policy = Recording::default();
        let scenario = MergeScenario::new(&["p"][..], &["x"][..], &["y", "p", "z"][..]);
        let out = three_way(&scenario, &policy);
        assert!(out.lines.is_empty());
        let seen = policy.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].a, vec!["x"]);
        assert_eq!(seen[0].b, vec!["y", "z"]);
    }

    #[test]
    fn test_last_ditch_is_preferred() {
        struct Joining;
        impl MergePolicy for Joining {
            fn last_ditch(&self, a: &str, b: &str) -> Option<String> {
                Some(format!("{a}+{b}"))
            }
        }
        let scenario = MergeScenario::new(&["a", "b"][..], &["a", "x"][..], &["a", "y"][..]);
        let out = three_way(&scenario, &Joining);
        assert!(!out.conflicted);
        assert_eq!(out.lines, vec!["a", "x+y"]);
    }

    #[test]
    fn test_tail_lines_are_tagged() {
        let scenario = MergeScenario::new(&["a"][..], &["a", "x"][..], &["a"][..]);
        let out = three_way(&scenario, &Tagging);
        assert_eq!(out.lines, vec!["a", "x@A"]);
    }

    fn small_lines() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-e]", 0..8)
    }

    /// Derive a side from `base`: keep the lines flagged in `keep` and insert
    /// `inserts[i]` in front of base line `i` (the last slot goes at the end).
    fn derive(base: &[String], keep: &[bool], inserts: &[Option<String>]) -> Vec<String> {
        let mut out = Vec::new();
        for (i, line) in base.iter().enumerate() {
            if let Some(Some(added)) = inserts.get(i) {
                out.push(added.clone());
            }
            if keep.get(i).copied().unwrap_or(true) {
                out.push(line.clone());
            }
        }
        if let Some(Some(added)) = inserts.get(base.len()) {
            out.push(added.clone());
        }
        out
    }

    fn distinct_base() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(any::<bool>(), 8).prop_map(|mask| {
            mask.iter()
                .zip('a'..='h')
                .filter(|(present, _)| **present)
                .map(|(_, c)| c.to_string())
                .collect()
        })
    }

    fn edits() -> impl Strategy<Value = (Vec<bool>, Vec<Option<String>>)> {
        (
            prop::collection::vec(any::<bool>(), 8),
            prop::collection::vec(prop::option::of("[0-9]"), 9),
        )
    }

    proptest! {
        #[test]
        fn prop_two_way_identity(x in small_lines()) {
            prop_assert_eq!(two_way(&x, &x, &Diff3), x);
        }

        #[test]
        fn prop_removed_base_lines_stay_removed(
            base in distinct_base(),
            (keep_a, ins_a) in edits(),
            (keep_b, ins_b) in edits(),
        ) {
            let a = derive(&base, &keep_a, &ins_a);
            let b = derive(&base, &keep_b, &ins_b);
            let out = three_way(&MergeScenario::new(&base[..], &a[..], &b[..]), &Greedy);
            for (i, line) in base.iter().enumerate() {
                let kept = keep_a[i] && keep_b[i];
                let seen = out.lines.iter().filter(|l| *l == line).count();
                prop_assert_eq!(seen, usize::from(kept), "line {} in {:?}", line, out.lines);
            }
        }

        #[test]
        fn prop_unchanged_a_never_conflicts(base in small_lines(), b in small_lines()) {
            let out = three_way(&MergeScenario::new(&base[..], &base[..], &b[..]), &Diff3);
            prop_assert!(!out.conflicted);
            prop_assert_eq!(out.lines, b);
        }

        #[test]
        fn prop_unchanged_b_never_conflicts(base in small_lines(), a in small_lines()) {
            let out = three_way(&MergeScenario::new(&base[..], &a[..], &base[..]), &Diff3);
            prop_assert!(!out.conflicted);
            prop_assert_eq!(out.lines, a);
        }
    }
}
