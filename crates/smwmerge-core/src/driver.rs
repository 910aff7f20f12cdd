//! Whole-file merge: per-type merges, then reference repair.

use smwmerge_engine::{three_way, MergeScenario, Side};
use tracing::info;

use crate::config::Settings;
use crate::errors::Result;
use crate::record::RecordKind;
use crate::repair::RepairedSnapshot;
use crate::snapshot::{Snapshot, TypeOrder};
use crate::strategy::{ConflictReporter, StrategyKind};

/// How one record type fared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindOutcome {
    pub kind: RecordKind,
    pub strategy: StrategyKind,
    /// Lines contributed to the merged output.
    pub records: usize,
    pub conflicted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub outcomes: Vec<KindOutcome>,
    /// True if any record type conflicted or any merged record was dropped.
    pub conflicted: bool,
    pub dangling: usize,
    pub dropped: usize,
    /// The merged file, without a trailing line break.
    pub output: String,
}

/// Merge `a` and `b` against their common ancestor `base`.
///
/// `order` must have seen all three snapshots.
pub fn merge_snapshots(
    a: &Snapshot,
    b: &Snapshot,
    base: &Snapshot,
    order: &TypeOrder,
    settings: &Settings,
    reporter: &dyn ConflictReporter,
) -> MergeReport {
    let table = settings.merge.strategy_table();
    let mut report = MergeReport::default();
    let mut merged: Vec<String> = Vec::new();

    for kind in order.kinds() {
        let strategy = table.strategy_for(kind);
        if matches!(kind, RecordKind::Unknown(code) if !code.is_empty()) && !table.is_overridden(kind) {
            info!(kind = %kind, "unhandled record type, using {strategy:?}");
        }

        let (lines, conflicted) = match table.policy_for(kind, reporter) {
            Some(policy) => {
                let base_lines = base.serialized(kind);
                let a_lines = a.serialized(kind);
                let b_lines = b.serialized(kind);
                let scenario = MergeScenario::new(&base_lines[..], &a_lines[..], &b_lines[..]);
                let outcome = three_way(&scenario, &policy);
                (outcome.lines, outcome.conflicted)
            }
            None => {
                let primary = match settings.merge.primary_side {
                    Side::A => a,
                    Side::B => b,
                };
                (primary.serialized(kind), false)
            }
        };

        info!(kind = %kind, ?strategy, records = lines.len(), conflicted, "merged record type");
        report.conflicted |= conflicted;
        report.outcomes.push(KindOutcome {
            kind: kind.clone(),
            strategy,
            records: lines.len(),
            conflicted,
        });
        merged.extend(lines);
    }

    let mut snapshot =
        RepairedSnapshot::from_merged(&merged, settings.repair.hide_unreferenced_signals);
    let repair = snapshot.repair();
    report.dangling = repair.dangling;
    report.dropped = snapshot.dropped();
    report.conflicted |= report.dropped > 0;
    report.output = snapshot.render();

    info!(
        conflicted = report.conflicted,
        dangling = report.dangling,
        dropped = report.dropped,
        "merge finished"
    );
    report
}

/// Parse three file contents (A, B, then the ancestor) and merge them.
pub fn merge_texts(
    a: &str,
    b: &str,
    base: &str,
    settings: &Settings,
    reporter: &dyn ConflictReporter,
) -> Result<MergeReport> {
    let mut order = TypeOrder::new();
    let a = Snapshot::parse(a, &mut order)?;
    let b = Snapshot::parse(b, &mut order)?;
    let base = Snapshot::parse(base, &mut order)?;
    Ok(merge_snapshots(&a, &b, &base, &order, settings, reporter))
}
