//! Whole-file snapshots and the shared record-type order.

use std::collections::{BTreeMap, HashMap};

use smwmerge_engine::{two_way, Diff3};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::record::{keys, Record, RecordKind, NEWLINE, RECORD_DELIMITER};

/// Signals every program has without declaring them: logic low, logic high
/// and the local processor.
pub const RESERVED_SIGNALS: [(&str, &str); 3] = [("1", "0"), ("2", "1"), ("3", "Local")];

/// Build the reserved signal records.
pub fn reserved_signals() -> Vec<Record> {
    RESERVED_SIGNALS
        .iter()
        .filter_map(|(id, name)| {
            let text = [
                format!("{}={}", keys::TYPE, RecordKind::Signal.code()),
                format!("{}={id}", keys::REF),
                format!("{}={name}", keys::NAME),
            ]
            .join(NEWLINE);
            Record::parse(&text).ok()
        })
        .collect()
}

// ──────────────────────────────────────────────────────────────
// Type order
// ──────────────────────────────────────────────────────────────

/// Output grouping of record types, accumulated across every loaded file.
///
/// Each file's own first-seen order is merged in with the two-way merge, so
/// the result is an interleaving that respects every file's order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeOrder {
    kinds: Vec<RecordKind>,
}

impl TypeOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn integrate(&mut self, kinds: &[RecordKind]) {
        let current: Vec<&str> = self.kinds.iter().map(RecordKind::code).collect();
        let incoming: Vec<&str> = kinds.iter().map(RecordKind::code).collect();
        self.kinds = two_way(&current, &incoming, &Diff3)
            .iter()
            .map(|code| RecordKind::from_code(code))
            .collect();
    }

    pub fn kinds(&self) -> &[RecordKind] {
        &self.kinds
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

// ──────────────────────────────────────────────────────────────
// Snapshot
// ──────────────────────────────────────────────────────────────

/// One input file, parsed and grouped by record type.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    order: Vec<RecordKind>,
    records: BTreeMap<RecordKind, Vec<Record>>,
    /// Per type: self-id to index into `records`.
    ids: BTreeMap<RecordKind, HashMap<String, usize>>,
    reserved: Vec<Record>,
}

impl Snapshot {
    /// Parse a whole file and fold its type order into `order`.
    ///
    /// Children are collapsed to the neutral child key, and symbol inputs
    /// and outputs are rewritten from signal ids to signal names so that
    /// independently renumbered signals still line up.
    pub fn parse(text: &str, order: &mut TypeOrder) -> Result<Self> {
        let mut snapshot = Snapshot {
            reserved: reserved_signals(),
            ..Default::default()
        };

        for chunk in text.split(RECORD_DELIMITER) {
            if chunk.is_empty() {
                continue;
            }
            let mut record = Record::parse(chunk)?;
            record.collapse_children();
            snapshot.push(record);
        }

        order.integrate(&snapshot.order);
        snapshot.name_signals();
        Ok(snapshot)
    }

    fn push(&mut self, record: Record) {
        let kind = record.kind().clone();
        if !self.records.contains_key(&kind) {
            self.order.push(kind.clone());
        }
        let list = self.records.entry(kind.clone()).or_default();
        if let Some(id) = record.self_id() {
            self.ids
                .entry(kind)
                .or_default()
                .insert(id.to_string(), list.len());
        }
        list.push(record);
    }

    fn name_signals(&mut self) {
        let Some(symbols) = self.records.get(&RecordKind::Symbol) else {
            return;
        };

        let mut renames = Vec::new();
        for (index, symbol) in symbols.iter().enumerate() {
            for port in symbol.signal_ports() {
                let id = symbol.value(&port).unwrap_or_default();
                match self.signal(id) {
                    Some(signal) => {
                        renames.push((index, port, signal.name().to_string()));
                    }
                    None => warn!(
                        symbol = symbol.self_id().unwrap_or_default(),
                        port = %port,
                        signal = id,
                        "symbol references an unknown signal"
                    ),
                }
            }
        }

        debug!(count = renames.len(), "renamed symbol signals");
        if let Some(symbols) = self.records.get_mut(&RecordKind::Symbol) {
            for (index, port, name) in renames {
                if let Some(value) = symbols.get_mut(index).and_then(|s| s.value_mut(&port)) {
                    *value = name;
                }
            }
        }
    }

    /// Record types in the order this file first mentions them.
    pub fn kinds(&self) -> &[RecordKind] {
        &self.order
    }

    pub fn records(&self, kind: &RecordKind) -> &[Record] {
        self.records.get(kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find a record of `kind` by its id.
    pub fn lookup(&self, kind: &RecordKind, id: &str) -> Option<&Record> {
        let index = self.ids.get(kind)?.get(id)?;
        self.records.get(kind)?.get(*index)
    }

    /// Find a signal by id, falling back to the reserved signals.
    pub fn signal(&self, id: &str) -> Option<&Record> {
        self.lookup(&RecordKind::Signal, id)
            .or_else(|| self.reserved.iter().find(|s| s.self_id() == Some(id)))
    }

    /// The records of one type, serialized one per line for merging.
    pub fn serialized(&self, kind: &RecordKind) -> Vec<String> {
        self.records(kind).iter().map(Record::render).collect()
    }
}
