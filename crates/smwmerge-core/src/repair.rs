//! Reference repair.
//!
//! The concatenated merge output mixes three id namespaces: untagged ids from
//! the common ancestor and side-tagged ids from A and B. Repair gives every
//! record one final id, unique within its type, and rewrites every reference
//! (typed cross references, parents, ordinal children and symbol signal
//! ports) to point at the final id of its target.

use std::collections::BTreeMap;

use smwmerge_engine::Side;
use tracing::{debug, error, warn};

use crate::record::{keys, Record, RecordKind, CROSS_REFERENCES, NEWLINE};
use crate::snapshot::reserved_signals;

/// A record known to the reference tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handle {
    Record(usize),
    Reserved(usize),
}

/// Per-type id tables: one per input namespace, plus the final ids.
#[derive(Debug, Default)]
struct RefTables {
    base: BTreeMap<String, Handle>,
    a: BTreeMap<String, Handle>,
    b: BTreeMap<String, Handle>,
    claimed: BTreeMap<String, Handle>,
}

impl RefTables {
    fn table(&self, side: Option<Side>) -> &BTreeMap<String, Handle> {
        match side {
            None => &self.base,
            Some(Side::A) => &self.a,
            Some(Side::B) => &self.b,
        }
    }

    fn table_mut(&mut self, side: Option<Side>) -> &mut BTreeMap<String, Handle> {
        match side {
            None => &mut self.base,
            Some(Side::A) => &mut self.a,
            Some(Side::B) => &mut self.b,
        }
    }

    /// Resolve an id seen on `side`.
    ///
    /// A side-tagged id is looked up in its own side's table, then the base
    /// table, then the other side's. An untagged id tries base, A, then B.
    ///
    /// The last level can bind a reference to a record from the other side
    /// that happens to reuse the same id, when neither its own side nor the
    /// base knows that id.
    fn lookup(&self, side: Option<Side>, id: &str) -> Option<Handle> {
        let order = match side {
            None => [None, Some(Side::A), Some(Side::B)],
            Some(s) => [Some(s), None, Some(s.other())],
        };
        order
            .into_iter()
            .find_map(|s| self.table(s).get(id).copied())
    }

    /// Claim a final id for `record`.
    ///
    /// Prefers the base id, then B's, then A's. If all are taken by other
    /// records, counts up from the first of them as an integer until a free
    /// id turns up; a non-integer start counts from zero, and counting past
    /// `u64::MAX` wraps around to 1. Returns the id and whether it had to be
    /// invented.
    fn claim(&mut self, record: &Record, handle: Handle) -> (String, bool) {
        if let Some(id) = record.self_id() {
            if self.claimed.get(id) == Some(&handle) {
                return (id.to_string(), false);
            }
        }

        for side in [None, Some(Side::B), Some(Side::A)] {
            if let Some(id) = record.id(side) {
                if !self.claimed.contains_key(id) {
                    self.claimed.insert(id.to_string(), handle);
                    return (id.to_string(), false);
                }
            }
        }

        let start = record
            .self_id()
            .or_else(|| record.id(Some(Side::B)))
            .or_else(|| record.id(Some(Side::A)))
            .unwrap_or_default();
        let mut next = start.trim().parse::<u64>().unwrap_or(0);
        let id = loop {
            next = next.checked_add(1).unwrap_or(1);
            let candidate = next.to_string();
            if !self.claimed.contains_key(&candidate) {
                break candidate;
            }
        };
        self.claimed.insert(id.clone(), handle);
        (id, true)
    }
}

fn side_name(side: Option<Side>) -> &'static str {
    side.map_or("base", Side::name)
}

fn is_conflict_marker(line: &str) -> bool {
    line.starts_with("<<<<<<< ") || line == "=======" || line.starts_with(">>>>>>> ")
}

fn rewrite(record: &mut Record, key: &str, value: String) {
    if let Err(e) = record.set_value(key, value) {
        warn!(error = %e, "reference rewrite failed");
    }
}

/// Counters from one repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Records whose preferred ids were all taken and got a fresh one.
    pub renumbered: usize,
    /// References whose target could not be found.
    pub dangling: usize,
}

/// Merged output re-read as records, ready for reference repair.
#[derive(Debug)]
pub struct RepairedSnapshot {
    order: Vec<RecordKind>,
    groups: BTreeMap<RecordKind, Vec<usize>>,
    records: Vec<Record>,
    reserved: Vec<Record>,
    tables: BTreeMap<RecordKind, RefTables>,
    hide_unreferenced_signals: bool,
    dropped: usize,
}

impl RepairedSnapshot {
    /// Re-read merged lines, one record per line.
    ///
    /// A line that no longer parses is logged and dropped; see
    /// [`dropped`](Self::dropped). Conflict markers are kept in place.
    pub fn from_merged<S: AsRef<str>>(lines: &[S], hide_unreferenced_signals: bool) -> Self {
        let reserved = reserved_signals();
        let mut signals = RefTables::default();
        for (i, signal) in reserved.iter().enumerate() {
            if let Some(id) = signal.self_id() {
                signals.base.insert(id.to_string(), Handle::Reserved(i));
            }
        }

        let mut snapshot = RepairedSnapshot {
            order: Vec::new(),
            groups: BTreeMap::new(),
            records: Vec::new(),
            reserved,
            tables: BTreeMap::from([(RecordKind::Signal, signals)]),
            hide_unreferenced_signals,
            dropped: 0,
        };

        let mut last_kind = RecordKind::Unknown(String::new());
        for line in lines {
            let line = line.as_ref();
            if is_conflict_marker(line) {
                snapshot.push(Record::marker(line, last_kind.clone()));
                continue;
            }
            match Record::parse(line) {
                Ok(mut record) => {
                    record.number_children();
                    last_kind = record.kind().clone();
                    snapshot.push(record);
                }
                Err(e) => {
                    error!(error = %e, "dropping merged record that no longer parses");
                    snapshot.dropped += 1;
                }
            }
        }
        snapshot
    }

    fn push(&mut self, record: Record) {
        let kind = record.kind().clone();
        if !self.groups.contains_key(&kind) {
            self.order.push(kind.clone());
        }
        if record.has_any_id() {
            self.tables.entry(kind.clone()).or_default();
        }
        self.groups.entry(kind).or_default().push(self.records.len());
        self.records.push(record);
    }

    fn record(&self, handle: Handle) -> Option<&Record> {
        match handle {
            Handle::Record(i) => self.records.get(i),
            Handle::Reserved(i) => self.reserved.get(i),
        }
    }

    fn indices(&self, kind: &RecordKind) -> Vec<usize> {
        self.groups.get(kind).cloned().unwrap_or_default()
    }

    /// Assign final ids and rewrite every reference.
    pub fn repair(&mut self) -> RepairReport {
        let mut report = RepairReport::default();

        for kind in self.order.clone() {
            if !self.tables.contains_key(&kind) {
                continue;
            }
            for index in self.indices(&kind) {
                self.assign_id(&kind, index, &mut report);
            }
        }

        if self.hide_unreferenced_signals && self.groups.contains_key(&RecordKind::Symbol) {
            for index in self.indices(&RecordKind::Signal) {
                let signal = &mut self.records[index];
                if signal.has_any_id() {
                    signal.set_hidden(true);
                }
            }
        }

        self.restore_signals(&mut report);
        self.correct_cross_refs(&mut report);

        debug!(
            renumbered = report.renumbered,
            dangling = report.dangling,
            "reference repair finished"
        );
        report
    }

    fn assign_id(&mut self, kind: &RecordKind, index: usize, report: &mut RepairReport) {
        let record = &self.records[index];
        if !record.has_any_id() {
            return;
        }
        let Some(tables) = self.tables.get_mut(kind) else {
            return;
        };

        let handle = Handle::Record(index);
        let (id, invented) = tables.claim(record, handle);
        if invented {
            report.renumbered += 1;
        }
        for side in [None, Some(Side::A), Some(Side::B)] {
            if let Some(old) = record.id(side) {
                debug!(kind = %kind, side = side_name(side), from = old, to = %id, "registered reference");
                tables.table_mut(side).insert(old.to_string(), handle);
            }
        }
        self.records[index].set_ref(id);
    }

    /// Signal names to signals, from the base table, then A, then B; later
    /// tables win.
    fn signal_names(&self) -> BTreeMap<String, Handle> {
        let mut names = BTreeMap::new();
        let Some(tables) = self.tables.get(&RecordKind::Signal) else {
            return names;
        };
        for side in [None, Some(Side::A), Some(Side::B)] {
            for handle in tables.table(side).values() {
                if let Some(signal) = self.record(*handle) {
                    names.insert(signal.name().to_string(), *handle);
                }
            }
        }
        names
    }

    /// Turn symbol ports back from signal names into final signal ids, and
    /// show every signal that is still referenced.
    fn restore_signals(&mut self, report: &mut RepairReport) {
        let names = self.signal_names();
        let mut updates = Vec::new();
        let mut referenced = Vec::new();

        for index in self.indices(&RecordKind::Symbol) {
            let symbol = &self.records[index];
            for port in symbol.signal_ports() {
                let name = symbol.value(&port).unwrap_or_default();
                let target = names
                    .get(name)
                    .and_then(|h| self.record(*h).and_then(Record::self_id).map(|id| (*h, id)));
                match target {
                    Some((handle, id)) => {
                        updates.push((index, port, id.to_string()));
                        referenced.push(handle);
                    }
                    None => {
                        warn!(
                            symbol = symbol.self_id().unwrap_or_default(),
                            port = %port,
                            signal = name,
                            "could not find signal for symbol port"
                        );
                        report.dangling += 1;
                    }
                }
            }
        }

        for (index, port, id) in updates {
            rewrite(&mut self.records[index], &port, id);
        }
        for handle in referenced {
            if let Handle::Record(i) = handle {
                self.records[i].set_hidden(false);
            }
        }
    }

    fn correct_cross_refs(&mut self, report: &mut RepairReport) {
        for kind in self.order.clone() {
            for index in self.indices(&kind) {
                if self.records[index].is_marker() {
                    continue;
                }

                for (key, target) in &CROSS_REFERENCES {
                    if self.records[index].has_key(key) {
                        self.correct(index, key, target, report);
                    }
                }

                let top_level = self.records[index]
                    .parent_id()
                    .map(|parent| parent.is_empty() || parent == "0");
                match top_level {
                    Some(true) => debug!(kind = %kind, "top-level record"),
                    Some(false) => self.correct(index, keys::PARENT, &kind, report),
                    None => {}
                }

                if self.records[index].is_parent() {
                    let mut n = 1;
                    loop {
                        let key = format!("C{n}");
                        if !self.records[index].has_key(&key) {
                            break;
                        }
                        self.correct(index, &key, &kind, report);
                        n += 1;
                    }
                }
            }
        }
    }

    /// Point `key` of record `index` at the final id of its target.
    fn correct(&mut self, index: usize, key: &str, target: &RecordKind, report: &mut RepairReport) {
        let record = &self.records[index];
        let (Some(side), Some(value)) = (record.source(key), record.value(key)) else {
            return;
        };

        let resolved = self
            .tables
            .get(target)
            .and_then(|tables| tables.lookup(side, value))
            .and_then(|handle| self.record(handle))
            .and_then(Record::self_id)
            .map(str::to_string);

        match resolved {
            Some(id) => rewrite(&mut self.records[index], key, id),
            None => {
                warn!(
                    kind = %record.kind(),
                    id = record.self_id().unwrap_or_default(),
                    key,
                    target = %target,
                    side = side_name(side),
                    value,
                    "could not find referenced record"
                );
                report.dangling += 1;
            }
        }
    }

    pub fn kinds(&self) -> &[RecordKind] {
        &self.order
    }

    pub fn records(&self, kind: &RecordKind) -> impl Iterator<Item = &Record> {
        self.groups
            .get(kind)
            .into_iter()
            .flatten()
            .filter_map(|i| self.records.get(*i))
    }

    /// Merged lines that failed to parse and were left out.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Serialize the visible records, grouped by type.
    pub fn render(&self) -> String {
        self.order
            .iter()
            .flat_map(|kind| self.records(kind))
            .filter(|r| !r.is_hidden())
            .map(Record::render)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(NEWLINE)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn rec(lines: &[&str]) -> String {
        let mut out = vec!["["];
        out.extend_from_slice(lines);
        out.push("]");
        out.join(NEWLINE)
    }

    fn repaired(lines: &[String]) -> (RepairedSnapshot, RepairReport) {
        let mut snapshot = RepairedSnapshot::from_merged(lines, true);
        let report = snapshot.repair();
        (snapshot, report)
    }

    fn ids(snapshot: &RepairedSnapshot, kind: &RecordKind) -> Vec<String> {
        snapshot
            .records(kind)
            .filter_map(|r| r.self_id().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_colliding_side_ids_get_distinct_final_ids() {
        let lines = vec![
            rec(&["ObjTp=Sg", "H-A=4", "Nm=Foo"]),
            rec(&["ObjTp=Sg", "H-B=4", "Nm=Bar"]),
        ];
        let (snapshot, report) = repaired(&lines);
        assert_eq!(ids(&snapshot, &RecordKind::Signal), vec!["4", "5"]);
        assert_eq!(report.renumbered, 1);
    }

    #[test]
    fn test_preference_order_base_then_b_then_a() {
        let lines = vec![
            rec(&["ObjTp=Hd", "H=7", "Nm=First"]),
            rec(&["ObjTp=Hd", "H=7", "H-B=8", "H-A=9", "Nm=Second"]),
            rec(&["ObjTp=Hd", "H-B=8", "H-A=9", "Nm=Third"]),
        ];
        let (snapshot, _) = repaired(&lines);
        assert_eq!(ids(&snapshot, &RecordKind::Header), vec!["7", "8", "9"]);
    }

    #[test]
    fn test_renumbering_wraps_past_largest_id() {
        let lines = vec![
            rec(&["ObjTp=Sm", "H-A=18446744073709551615", "Nm=First"]),
            rec(&["ObjTp=Sm", "H-B=18446744073709551615", "Nm=Second"]),
        ];
        let (snapshot, report) = repaired(&lines);
        assert_eq!(
            ids(&snapshot, &RecordKind::Symbol),
            vec!["18446744073709551615", "1"]
        );
        assert_eq!(report.renumbered, 1);
    }

    #[test]
    fn test_every_record_gets_a_unique_id() {
        let mut lines = Vec::new();
        for i in 0..20 {
            let name = format!("Nm=S{i}");
            let side = if i % 2 == 0 { "H-A=4" } else { "H-B=4" };
            lines.push(rec(&["ObjTp=Sg", side, &name]));
        }
        lines.push(rec(&["ObjTp=Sg", "H=6", "Nm=Base"]));
        let (snapshot, _) = repaired(&lines);

        let assigned = ids(&snapshot, &RecordKind::Signal);
        assert_eq!(assigned.len(), 21);
        let unique: HashSet<_> = assigned.iter().collect();
        assert_eq!(unique.len(), assigned.len());
    }

    #[test]
    fn test_side_parents_and_children_follow_renumbering() {
        let lines = vec![
            rec(&["ObjTp=Sm", "H=10", "Nm=Existing"]),
            rec(&["ObjTp=Sm", "H-A=10", "Cmn1=Folder", "SmC=156", "mC=n", "C0H-A=11"]),
            rec(&["ObjTp=Sm", "H-A=11", "Nm=Child", "PrH-A=10"]),
        ];
        let (snapshot, report) = repaired(&lines);
        assert_eq!(report.dangling, 0);
        assert_eq!(
            snapshot.render(),
            [
                rec(&["ObjTp=Sm", "H=10", "Nm=Existing"]),
                rec(&["ObjTp=Sm", "H=11", "Cmn1=Folder", "SmC=156", "mC=1", "C1=12"]),
                rec(&["ObjTp=Sm", "H=12", "Nm=Child", "PrH=11"]),
            ]
            .join(NEWLINE)
        );
    }

    #[test]
    fn test_dangling_parent_is_left_alone() {
        let lines = vec![rec(&["ObjTp=Sm", "H=7", "Nm=Orphan", "PrH=99"])];
        let (snapshot, report) = repaired(&lines);
        assert_eq!(report.dangling, 1);
        let orphan = snapshot.records(&RecordKind::Symbol).next().unwrap();
        assert_eq!(orphan.parent_id(), Some("99"));
    }

    #[test]
    fn test_top_level_parent_is_not_dangling() {
        let lines = vec![rec(&["ObjTp=Sm", "H=7", "Nm=Top", "PrH=0"])];
        let (_, report) = repaired(&lines);
        assert_eq!(report.dangling, 0);
    }

    #[test]
    fn test_typed_cross_reference_follows_target() {
        let lines = vec![
            rec(&["ObjTp=Sm", "H=20", "Nm=Keep"]),
            rec(&["ObjTp=Sm", "H-B=20", "Nm=Moved"]),
            rec(&["ObjTp=Dv", "H=1", "SmH-B=20"]),
        ];
        let (snapshot, report) = repaired(&lines);
        assert_eq!(report.dangling, 0);
        let device = snapshot.records(&RecordKind::Device).next().unwrap();
        assert_eq!(device.value(keys::SYMBOL_XREF), Some("21"));
    }

    #[test]
    fn test_side_reference_binds_to_other_side_as_last_resort() {
        let lines = vec![
            rec(&["ObjTp=Db", "H-B=3", "Nm=Controller"]),
            rec(&["ObjTp=Sm", "H-A=1", "Nm=Program", "DbH-A=3"]),
        ];
        let (snapshot, report) = repaired(&lines);
        assert_eq!(report.dangling, 0);
        let symbol = snapshot.records(&RecordKind::Symbol).next().unwrap();
        assert_eq!(symbol.value(keys::CONTROLLER_XREF), Some("3"));
    }

    #[test]
    fn test_untagged_reference_falls_back_to_side_tables() {
        let lines = vec![
            rec(&["ObjTp=Db", "H-A=3", "Nm=Controller"]),
            rec(&["ObjTp=Sm", "H=1", "Nm=Program", "DbH=3"]),
        ];
        let (snapshot, report) = repaired(&lines);
        assert_eq!(report.dangling, 0);
        let symbol = snapshot.records(&RecordKind::Symbol).next().unwrap();
        assert_eq!(symbol.value(keys::CONTROLLER_XREF), Some("3"));
    }

    #[test]
    fn test_signals_are_restored_and_unreferenced_hidden() {
        let lines = vec![
            rec(&["ObjTp=Sg", "H=4", "Nm=Power"]),
            rec(&["ObjTp=Sg", "H=5", "Nm=Unused"]),
            rec(&["ObjTp=Sm", "H=10", "I1=Power", "O1=Local"]),
        ];
        let (snapshot, report) = repaired(&lines);
        assert_eq!(report.dangling, 0);
        assert_eq!(
            snapshot.render(),
            [
                rec(&["ObjTp=Sg", "H=4", "Nm=Power"]),
                rec(&["ObjTp=Sm", "H=10", "I1=4", "O1=3"]),
            ]
            .join(NEWLINE)
        );
    }

    #[test]
    fn test_signals_stay_visible_without_symbols() {
        let lines = vec![rec(&["ObjTp=Sg", "H=3", "Nm=Local"])];
        let (snapshot, _) = repaired(&lines);
        assert_eq!(snapshot.render(), lines[0]);
    }

    #[test]
    fn test_signal_hiding_can_be_disabled() {
        let lines = vec![
            rec(&["ObjTp=Sg", "H=5", "Nm=Unused"]),
            rec(&["ObjTp=Sm", "H=10", "Nm=Logic"]),
        ];
        let mut snapshot = RepairedSnapshot::from_merged(&lines, false);
        snapshot.repair();
        assert_eq!(snapshot.render(), lines.join(NEWLINE));
    }

    #[test]
    fn test_unknown_signal_name_is_dangling() {
        let lines = vec![rec(&["ObjTp=Sm", "H=10", "I1=Nowhere"])];
        let (_, report) = repaired(&lines);
        assert_eq!(report.dangling, 1);
    }

    #[test]
    fn test_unparseable_record_is_dropped() {
        let lines = vec![
            rec(&["ObjTp=Hd", "Nm=a", "Nm=b"]),
            rec(&["ObjTp=Hd", "Nm=ok"]),
        ];
        let (snapshot, _) = repaired(&lines);
        assert_eq!(snapshot.dropped(), 1);
        assert_eq!(snapshot.render(), lines[1]);
    }

    #[test]
    fn test_conflict_markers_pass_through() {
        let lines = vec![
            "<<<<<<< A".to_string(),
            rec(&["ObjTp=Hd", "Nm=a"]),
            "=======".to_string(),
            rec(&["ObjTp=Hd", "Nm=b"]),
            ">>>>>>> B".to_string(),
        ];
        let (snapshot, _) = repaired(&lines);
        assert_eq!(snapshot.render(), lines.join(NEWLINE));
    }
}
