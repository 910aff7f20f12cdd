use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use smwmerge_engine::Side;

use crate::errors::{Result, SmwError};
use crate::logging::LogLevel;
use crate::strategy::{StrategyKind, StrategyTable};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub merge: MergeSettings,
    #[serde(default)]
    pub repair: RepairSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSettings {
    /// Side whose records are kept for types that are not merged.
    #[serde(default = "default_primary_side")]
    pub primary_side: Side,
    /// Record-type code to strategy, overriding the built-in table.
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyKind>,
    /// Keys the highest-value-wins strategy compares as numbers.
    #[serde(default)]
    pub numeric_keys: Vec<String>,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            primary_side: default_primary_side(),
            strategies: BTreeMap::new(),
            numeric_keys: Vec::new(),
        }
    }
}

impl MergeSettings {
    pub fn strategy_table(&self) -> StrategyTable {
        StrategyTable::new(self.strategies.clone(), self.numeric_keys.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairSettings {
    #[serde(default = "default_hide_unreferenced_signals")]
    pub hide_unreferenced_signals: bool,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            hide_unreferenced_signals: default_hide_unreferenced_signals(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: Option<LogLevel>,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_primary_side() -> Side {
    Side::B
}
fn default_hide_unreferenced_signals() -> bool {
    true
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SmwError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&content).map_err(|source| SmwError::Config {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordKind;

    #[test]
    fn test_defaults_from_empty_file() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.merge.primary_side, Side::B);
        assert!(settings.repair.hide_unreferenced_signals);
        assert!(settings.logging.level.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let settings: Settings = serde_json::from_str(
            r#"{"merge": {"primary_side": "a", "strategies": {"Bw": "greedy"}},
                "logging": {"level": "debug"}}"#,
        )
        .unwrap();
        assert_eq!(settings.merge.primary_side, Side::A);
        assert_eq!(settings.logging.level, Some(LogLevel::Debug));
        let table = settings.merge.strategy_table();
        assert_eq!(table.strategy_for(&RecordKind::OpenSymbol), StrategyKind::Greedy);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("smwmerge.json");

        let mut settings = Settings::default();
        settings.merge.numeric_keys = vec!["Rev".into()];
        settings.repair.hide_unreferenced_signals = false;
        settings.logging.file = Some(PathBuf::from("merge.log"));
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SmwError::Config { .. })
        ));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Settings::load(&dir.path().join("absent.json")),
            Err(SmwError::Io { .. })
        ));
    }
}
