pub mod config;
pub mod driver;
pub mod errors;
pub mod io;
pub mod logging;
pub mod record;
pub mod repair;
pub mod snapshot;
pub mod strategy;

pub use config::Settings;
pub use driver::{merge_snapshots, merge_texts, KindOutcome, MergeReport};
pub use errors::{Result, SmwError};
pub use record::{Record, RecordKind};
pub use repair::{RepairReport, RepairedSnapshot};
pub use snapshot::{Snapshot, TypeOrder};
pub use strategy::{ConflictReporter, LogReporter, StrategyKind, StrategyTable};
