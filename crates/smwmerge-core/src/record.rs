//! The record model.
//!
//! A SIMPL Windows file is a sequence of bracketed records, each a list of
//! `key=value` lines. [`Record`] keeps the entries in their original order so
//! that a parsed record serializes back to the same text, and remembers which
//! side (A or B) contributed each side-tagged key.

use std::fmt;

use smwmerge_engine::Side;

use crate::errors::{Result, SmwError};

/// Line terminator used throughout input and output.
pub const NEWLINE: &str = "\r\n";

/// Separator between records in a file.
pub const RECORD_DELIMITER: &str = "\r\n]\r\n";

/// Keys with a fixed meaning.
pub mod keys {
    pub const TYPE: &str = "ObjTp";
    pub const NAME: &str = "Nm";
    /// Folder-like records carry their name here.
    pub const COMMENT: &str = "Cmn1";
    pub const PARENT: &str = "PrH";
    /// Neutral child key; stands in for the ordinal `C1`, `C2`, ...
    pub const CHILD: &str = "C0H";
    pub const REF: &str = "H";
    pub const SYMBOL_CATEGORY: &str = "SmC";
    pub const CHILD_COUNT: &str = "mC";
    pub const SYMBOL_XREF: &str = "SmH";
    pub const CRESNET_XREF: &str = "CmH";
    pub const CONTROLLER_XREF: &str = "DbH";
}

/// Record-type codes, as found in the `ObjTp` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Symbol,
    Signal,
    ProgramInfo,
    Header,
    FloatTable,
    Bank,
    OpenSymbol,
    Device,
    CresnetConfig,
    CentralController,
    Unknown(String),
}

impl RecordKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "Sm" => RecordKind::Symbol,
            "Sg" => RecordKind::Signal,
            "FSgntr" => RecordKind::ProgramInfo,
            "Hd" => RecordKind::Header,
            "FP" => RecordKind::FloatTable,
            "Bk" => RecordKind::Bank,
            "Bw" => RecordKind::OpenSymbol,
            "Dv" => RecordKind::Device,
            "Cm" => RecordKind::CresnetConfig,
            "Db" => RecordKind::CentralController,
            other => RecordKind::Unknown(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            RecordKind::Symbol => "Sm",
            RecordKind::Signal => "Sg",
            RecordKind::ProgramInfo => "FSgntr",
            RecordKind::Header => "Hd",
            RecordKind::FloatTable => "FP",
            RecordKind::Bank => "Bk",
            RecordKind::OpenSymbol => "Bw",
            RecordKind::Device => "Dv",
            RecordKind::CresnetConfig => "Cm",
            RecordKind::CentralController => "Db",
            RecordKind::Unknown(code) => code,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Unknown(code) if code.is_empty() => f.write_str("(untyped)"),
            _ => f.write_str(self.code()),
        }
    }
}

/// Typed cross-reference keys and the record type each one points into.
pub const CROSS_REFERENCES: [(&str, RecordKind); 3] = [
    (keys::SYMBOL_XREF, RecordKind::Symbol),
    (keys::CRESNET_XREF, RecordKind::CresnetConfig),
    (keys::CONTROLLER_XREF, RecordKind::CentralController),
];

/// One `key=value` line of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    /// Side that contributed this entry, if it was side-tagged.
    pub side: Option<Side>,
    pub value: String,
}

/// Split a `PrH-A` style key into the bare key and its side.
fn split_side(raw: &str) -> (&str, Option<Side>) {
    match raw.split_once('-') {
        Some((key, suffix)) => match Side::from_suffix(suffix) {
            Some(side) => (key, Some(side)),
            None => (raw, None),
        },
        None => (raw, None),
    }
}

/// `I<n>` / `O<n>` symbol inputs and outputs, n >= 1.
pub fn is_signal_port(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some('I' | 'O'))
        && chars.as_str().parse::<u32>().is_ok_and(|n| n != 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    kind: RecordKind,
    entries: Vec<Entry>,
    /// Number of ordinal child keys `C1..Cn`.
    children: usize,
    /// Render ordinal child keys as `C0H`.
    collapsed: bool,
    hidden: bool,
    /// Verbatim text for lines that are not records (conflict markers).
    raw: Option<String>,
}

impl Record {
    /// Parse one record's text.
    ///
    /// Lines that are not `key=value` (including the `[` and `]` framing)
    /// are skipped. A repeated key with a different value is an error; a
    /// repeated key with the same value is absorbed. Each neutral child key
    /// becomes the next ordinal `C<k>`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut record = Record {
            kind: RecordKind::Unknown(String::new()),
            entries: Vec::new(),
            children: 0,
            collapsed: false,
            hidden: false,
            raw: None,
        };

        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            record.add(key, value)?;
        }

        record.kind = RecordKind::from_code(record.value(keys::TYPE).unwrap_or_default());
        Ok(record)
    }

    /// A non-record line carried through the output unchanged.
    pub fn marker(text: impl Into<String>, kind: RecordKind) -> Self {
        Record {
            kind,
            entries: Vec::new(),
            children: 0,
            collapsed: false,
            hidden: false,
            raw: Some(text.into()),
        }
    }

    fn add(&mut self, raw_key: &str, value: &str) -> Result<()> {
        let (key, side) = split_side(raw_key);
        let key = if key == keys::CHILD {
            self.children += 1;
            format!("C{}", self.children)
        } else {
            key.to_string()
        };

        match self.position(&key, side) {
            Some(i) if self.entries[i].value != value => Err(SmwError::DuplicateKey {
                key: raw_key.to_string(),
                existing: self.entries[i].value.clone(),
                incoming: value.to_string(),
            }),
            Some(i) => {
                self.entries[i].side = side;
                Ok(())
            }
            None => {
                self.entries.push(Entry {
                    key,
                    side,
                    value: value.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Index of the entry occupying `key`'s slot.
    ///
    /// The self-reference key keeps one slot per side; every other key has
    /// a single slot shared by all sides.
    fn position(&self, key: &str, side: Option<Side>) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.key == key && (key != keys::REF || e.side == side))
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_marker(&self) -> bool {
        self.raw.is_some()
    }

    /// Display name: `Nm`, or `Cmn1` for folder-like records.
    pub fn name(&self) -> &str {
        self.value(keys::NAME)
            .or_else(|| self.value(keys::COMMENT))
            .unwrap_or_default()
    }

    pub fn symbol_category(&self) -> Option<&str> {
        self.value(keys::SYMBOL_CATEGORY)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// Value of the first entry named `key`, whatever its side.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Side recorded for `key`: `Some(None)` for an untagged entry.
    pub fn source(&self, key: &str) -> Option<Option<Side>> {
        self.entries.iter().find(|e| e.key == key).map(|e| e.side)
    }

    pub fn value_mut(&mut self, key: &str) -> Option<&mut String> {
        self.entries
            .iter_mut()
            .find(|e| e.key == key)
            .map(|e| &mut e.value)
    }

    /// Replace the value of an existing key.
    pub fn set_value(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let slot = self.value_mut(key).ok_or_else(|| SmwError::MissingKey {
            key: key.to_string(),
        })?;
        *slot = value.into();
        Ok(())
    }

    /// This record's id as seen from `side` (`None` for the untagged id).
    pub fn id(&self, side: Option<Side>) -> Option<&str> {
        self.position(keys::REF, side)
            .map(|i| self.entries[i].value.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn self_id(&self) -> Option<&str> {
        self.id(None)
    }

    pub fn has_any_id(&self) -> bool {
        [None, Some(Side::A), Some(Side::B)]
            .into_iter()
            .any(|side| self.id(side).is_some())
    }

    /// Set the untagged id, creating it in place of the first side-tagged id
    /// if the record had none.
    pub fn set_ref(&mut self, id: impl Into<String>) {
        let id = id.into();
        if let Some(i) = self.position(keys::REF, None) {
            self.entries[i].value = id;
            return;
        }
        let at = self
            .entries
            .iter()
            .position(|e| e.key == keys::REF)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            at,
            Entry {
                key: keys::REF.to_string(),
                side: None,
                value: id,
            },
        );
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.value(keys::PARENT)
    }

    /// Records with a child count own their children, except devices, whose
    /// children must keep their fixed ordinals.
    pub fn is_parent(&self) -> bool {
        self.has_key(keys::CHILD_COUNT) && self.kind != RecordKind::Device
    }

    pub fn child_count(&self) -> usize {
        self.children
    }

    /// Values of `C1..Cn`, empty unless the record declares a child count.
    pub fn child_ids(&self) -> Vec<&str> {
        if !self.has_key(keys::CHILD_COUNT) {
            return Vec::new();
        }
        (1..)
            .map_while(|n| self.value(&format!("C{n}")))
            .collect()
    }

    fn child_ordinal(&self, key: &str) -> Option<usize> {
        key.strip_prefix('C')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| (1..=self.children).contains(n))
    }

    /// Prepare a freshly read record for merging: its children render as
    /// the neutral `C0H` key and its child count as `n`, so child lists
    /// align by value rather than by position.
    pub fn collapse_children(&mut self) {
        let Some(count) = self.child_count_mut() else {
            return;
        };
        *count = "n".to_string();
        self.children = (1..)
            .take_while(|n| self.has_key(&format!("C{n}")))
            .count();
        self.collapsed = true;
    }

    /// Rewrite the child count of a merged record to its real value.
    pub fn number_children(&mut self) {
        let children = self.children.to_string();
        if let Some(count) = self.child_count_mut() {
            *count = children;
        }
    }

    /// The `mC` value of a parent; `None` for any other record.
    fn child_count_mut(&mut self) -> Option<&mut String> {
        if self.kind == RecordKind::Device {
            return None;
        }
        self.value_mut(keys::CHILD_COUNT)
    }

    /// Symbol input/output keys (`I<n>`, `O<n>`).
    pub fn signal_ports(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| is_signal_port(&e.key))
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    /// Serialize as `[`, the entries, `]` joined by [`NEWLINE`].
    ///
    /// Side-tagged ids are never written; other side-tagged keys are written
    /// without their suffix. A record with nothing to write renders empty.
    pub fn render(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut out = vec!["[".to_string()];
        for entry in &self.entries {
            if entry.key == keys::REF && entry.side.is_some() {
                continue;
            }
            let key = if self.collapsed && self.child_ordinal(&entry.key).is_some() {
                keys::CHILD
            } else {
                entry.key.as_str()
            };
            out.push(format!("{key}={}", entry.value));
        }
        if out.len() == 1 {
            return String::new();
        }
        out.push("]".to_string());
        out.join(NEWLINE)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
