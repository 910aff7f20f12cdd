//! Sequence differ.
//!
//! Aligns two ordered line lists using the `similar` crate's Myers diff
//! (a minimal edit script, i.e. a longest-common-subsequence alignment) and
//! yields tagged [`LineEdit`]s lazily.
//!
//! Within a replaced block the most similar pair of lines is paired up with
//! intra-line [`EditTag::Hint`] guides and the lines around it are handled
//! the same way, in the manner of a human-readable diff. A block with no
//! pair similar enough is written as a whole: the shorter side first, and
//! removals first when both sides are the same length. Hints never carry
//! content: the merge algorithms drop them.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::ops::Range;

use similar::{Algorithm, DiffOp, DiffTag, TextDiff, capture_diff_slices};

use crate::types::{EditTag, LineEdit};

/// Replaced line pairs at least this similar get intra-line hints.
const HINT_RATIO: f32 = 0.75;

/// Lazy alignment of two line lists.
pub struct LineDiff<'a> {
    left: Vec<&'a str>,
    right: Vec<&'a str>,
    ops: std::vec::IntoIter<DiffOp>,
    pending: VecDeque<LineEdit<'a>>,
}

/// Align `left` against `right`.
///
/// `Same` lines appear once, `Removed` lines come from `left` only, `Added`
/// lines from `right` only. Inputs are not modified.
pub fn diff_lines<'a, L, R>(left: &'a [L], right: &'a [R]) -> LineDiff<'a>
where
    L: AsRef<str>,
    R: AsRef<str>,
{
    let left: Vec<&'a str> = left.iter().map(AsRef::as_ref).collect();
    let right: Vec<&'a str> = right.iter().map(AsRef::as_ref).collect();
    let ops = capture_diff_slices(Algorithm::Myers, &left, &right);
    LineDiff {
        left,
        right,
        ops: ops.into_iter(),
        pending: VecDeque::new(),
    }
}

/// Align `left` against `right` and drop the hint lines.
pub fn align<'a, L, R>(left: &'a [L], right: &'a [R]) -> Vec<LineEdit<'a>>
where
    L: AsRef<str>,
    R: AsRef<str>,
{
    diff_lines(left, right).filter(|e| !e.is_hint()).collect()
}

impl<'a> LineDiff<'a> {
    fn expand(&mut self, op: DiffOp) {
        let (tag, old, new) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                for i in old {
                    self.push(EditTag::Same, self.left[i]);
                }
            }
            DiffTag::Delete => {
                for i in old {
                    self.push(EditTag::Removed, self.left[i]);
                }
            }
            DiffTag::Insert => {
                for i in new {
                    self.push(EditTag::Added, self.right[i]);
                }
            }
            DiffTag::Replace => self.expand_replace(old, new),
        }
    }

    fn expand_replace(&mut self, old: Range<usize>, new: Range<usize>) {
        let mut best: Option<(f32, usize, usize)> = None;
        for n in new.clone() {
            for o in old.clone() {
                let ratio = TextDiff::from_chars(self.left[o], self.right[n]).ratio();
                if ratio >= HINT_RATIO && best.is_none_or(|(r, _, _)| ratio > r) {
                    best = Some((ratio, o, n));
                }
            }
        }

        let Some((_, o, n)) = best else {
            if new.len() < old.len() {
                self.push_all(EditTag::Added, new);
                self.push_all(EditTag::Removed, old);
            } else {
                self.push_all(EditTag::Removed, old);
                self.push_all(EditTag::Added, new);
            }
            return;
        };

        self.expand_replace(old.start..o, new.start..n);
        self.push_similar(self.left[o], self.right[n]);
        self.expand_replace(o + 1..old.end, n + 1..new.end);
    }

    fn push(&mut self, tag: EditTag, text: &'a str) {
        self.pending.push_back(LineEdit::new(tag, Cow::Borrowed(text)));
    }

    /// Push a range of `left` (for removals) or `right` (otherwise).
    fn push_all(&mut self, tag: EditTag, range: Range<usize>) {
        for i in range {
            let text = match tag {
                EditTag::Removed => self.left[i],
                _ => self.right[i],
            };
            self.push(tag, text);
        }
    }

    fn push_similar(&mut self, old: &'a str, new: &'a str) {
        let (old_guide, new_guide) = intraline_guides(old, new);
        self.push(EditTag::Removed, old);
        if !old_guide.is_empty() {
            self.pending
                .push_back(LineEdit::new(EditTag::Hint, Cow::Owned(old_guide)));
        }
        self.push(EditTag::Added, new);
        if !new_guide.is_empty() {
            self.pending
                .push_back(LineEdit::new(EditTag::Hint, Cow::Owned(new_guide)));
        }
    }
}

impl<'a> Iterator for LineDiff<'a> {
    type Item = LineEdit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(edit) = self.pending.pop_front() {
                return Some(edit);
            }
            let op = self.ops.next()?;
            self.expand(op);
        }
    }
}

/// Build the `-`/`+`/`^` guide strings marking where two similar lines differ.
fn intraline_guides(old: &str, new: &str) -> (String, String) {
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();
    let mut old_guide = String::new();
    let mut new_guide = String::new();

    for op in capture_diff_slices(Algorithm::Myers, &old_chars, &new_chars) {
        let (tag, o, n) = op.as_tag_tuple();
        let (old_mark, new_mark) = match tag {
            DiffTag::Equal => (' ', ' '),
            DiffTag::Delete => ('-', ' '),
            DiffTag::Insert => (' ', '+'),
            DiffTag::Replace => ('^', '^'),
        };
        old_guide.extend(std::iter::repeat_n(old_mark, o.len()));
        new_guide.extend(std::iter::repeat_n(new_mark, n.len()));
    }

    (
        old_guide.trim_end().to_string(),
        new_guide.trim_end().to_string(),
    )
}
