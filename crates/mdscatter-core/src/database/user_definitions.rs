//! Persistent named selections and vector definitions.
//!
//! Entries are keyed by `(target, section, name)` where the target is
//! usually a trajectory file name. The store is a single JSON file; writes
//! replace it entirely so the last writer wins.

use crate::domain::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const USER_DEFINITIONS_FILE: &str = "user_definitions.json";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionKey {
    pub target: String,
    pub section: String,
    pub name: String,
}

impl DefinitionKey {
    pub fn new(target: &str, section: &str, name: &str) -> Self {
        Self {
            target: target.to_string(),
            section: section.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDefinition {
    #[serde(flatten)]
    key: DefinitionKey,
    value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserDefinitions {
    path: Option<PathBuf>,
    entries: BTreeMap<DefinitionKey, Value>,
}

impl UserDefinitions {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the store; an unreadable or malformed file leaves it empty.
    pub fn load(path: &Path) -> Self {
        let mut store = Self {
            path: Some(path.to_path_buf()),
            entries: BTreeMap::new(),
        };
        if !path.exists() {
            return store;
        }
        let parsed = fs::read_to_string(path)
            .map_err(|source| source.to_string())
            .and_then(|text| {
                serde_json::from_str::<Vec<StoredDefinition>>(&text)
                    .map_err(|source| source.to_string())
            });
        match parsed {
            Ok(definitions) => {
                for definition in definitions {
                    store.entries.insert(definition.key, definition.value);
                }
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "user definitions could not be loaded");
            }
        }
        store
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, target: &str, section: &str, name: &str) -> Option<&Value> {
        self.entries.get(&DefinitionKey::new(target, section, name))
    }

    /// Looks a name up in `section` across every target.
    pub fn find(&self, section: &str, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key.section == section && key.name == name)
            .map(|(_, value)| value)
    }

    pub fn set(&mut self, key: DefinitionKey, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, target: &str, section: &str, name: &str) -> Option<Value> {
        self.entries.remove(&DefinitionKey::new(target, section, name))
    }

    pub fn names(&self, target: &str, section: &str) -> Vec<&str> {
        self.entries
            .keys()
            .filter(|key| key.target == target && key.section == section)
            .map(|key| key.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self) -> AnalysisResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let definitions: Vec<StoredDefinition> = self
            .entries
            .iter()
            .map(|(key, value)| StoredDefinition {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        let payload = serde_json::to_string_pretty(&definitions).map_err(|source| {
            AnalysisError::internal("IO.USER_DEFINITIONS", format!("failed to encode: {source}"))
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| {
                AnalysisError::io(
                    "IO.USER_DEFINITIONS",
                    format!("failed to create '{}': {source}", parent.display()),
                )
            })?;
        }
        fs::write(path, payload).map_err(|source| {
            AnalysisError::io(
                "IO.USER_DEFINITIONS",
                format!("failed to write '{}': {source}", path.display()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DefinitionKey, UserDefinitions};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn definitions_persist_and_reload() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("defs").join("user_definitions.json");
        let mut store = UserDefinitions::load(&path);
        assert!(store.is_empty());
        store.set(
            DefinitionKey::new("water.mdt", "atom_selection", "oxygens"),
            json!("element O"),
        );
        store.save().expect("save");

        let reloaded = UserDefinitions::load(&path);
        assert_eq!(
            reloaded.get("water.mdt", "atom_selection", "oxygens"),
            Some(&json!("element O"))
        );
        assert_eq!(reloaded.find("atom_selection", "oxygens"), Some(&json!("element O")));
        assert_eq!(reloaded.names("water.mdt", "atom_selection"), vec!["oxygens"]);
    }

    #[test]
    fn malformed_store_loads_empty() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("user_definitions.json");
        fs::write(&path, "{not json").expect("write");
        let store = UserDefinitions::load(&path);
        assert!(store.is_empty());
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
