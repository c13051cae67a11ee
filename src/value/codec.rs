//! JSON files holding named value trees.

use crate::value::error::{ValueError, ValueResult};
use crate::value::tree::ValueTree;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DATA_FILE_VERSION: u32 = 1;

/// An ordered collection of named values stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub version: u32,
    #[serde(default)]
    pub entries: Vec<ValueTree>,
}

impl Default for DataFile {
    fn default() -> Self {
        Self {
            version: DATA_FILE_VERSION,
            entries: Vec::new(),
        }
    }
}

impl DataFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `name`, replacing an entry of the same name.
    pub fn insert(&mut self, name: &str, value: &Value) {
        let tree = value.to_tree(name);
        match self.entries.iter_mut().find(|e| e.name() == Some(name)) {
            Some(existing) => *existing = tree,
            None => self.entries.push(tree),
        }
    }

    pub fn get(&self, name: &str) -> ValueResult<Value> {
        let tree = self
            .entries
            .iter()
            .find(|e| e.name() == Some(name))
            .ok_or_else(|| ValueError::UnknownKey(name.to_string()))?;
        Value::from_tree(tree)
    }

    /// Decode every entry, in file order.
    pub fn values(&self) -> ValueResult<IndexMap<String, Value>> {
        self.entries
            .iter()
            .map(|tree| {
                let name = tree.name().unwrap_or_default().to_string();
                Ok((name, Value::from_tree(tree)?))
            })
            .collect()
    }

    pub fn to_json_string(&self) -> ValueResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> ValueResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: &Path) -> ValueResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> ValueResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
