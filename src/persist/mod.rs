//! Persistence engine for the settings tree
//!
//! Each persisted subtree owns one backing file under the config directory.
//! A backing file is a flat TOML table mapping the dotted path of a parameter
//! (relative to the owning subtree) to its primitive value; parameter types
//! are reconstructed from the in-memory schema on load, never stored.
//!
//! Writes are atomic (temp file + rename) and serialized per backing file via
//! async locks handed out by the engine, so interleaved saves from concurrent
//! tasks cannot tear a file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::convert::RawValue;
use crate::tree::arena::{Arena, NodeId};

/// I/O or serialization failure during save or load.
///
/// A failed save never rolls back the in-memory commit that triggered it;
/// the caller decides whether to retry or surface the failure.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Parse error in {file}: {source}")]
    Parse {
        file: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// How far a save reaches from the node it was invoked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveScope {
    /// Write every backing file inside the subtree.
    WholeTree,
    /// Write only the single file owning the node's nearest persisted
    /// ancestor, leaving unrelated files untouched.
    OwningFileOnly,
}

/// Counters reported by a whole-tree load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Values applied onto the schema.
    pub hydrated: usize,
    /// File keys with no matching schema path, ignored.
    pub unknown: usize,
    /// File values the schema rejected (conversion or validation), ignored.
    pub invalid: usize,
}

/// File-level persistence: paths, locks, atomic reads and writes.
pub struct PersistenceEngine {
    config_dir: PathBuf,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PersistenceEngine {
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            config_dir,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Default config directory, `~/.config/chathub`.
    pub fn default_config_dir() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".config").join("chathub")
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Absolute path of a backing file. Stems may contain `/` for plugin
    /// files (`plugins/<id>` lands in a subdirectory).
    pub fn file_path(&self, stem: &str) -> PathBuf {
        self.config_dir.join(format!("{}.toml", stem))
    }

    /// Per-file async lock. Holders serialize the whole
    /// convert→validate→commit→write pipeline for that file.
    pub fn file_lock(&self, stem: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("file lock registry poisoned");
        locks
            .entry(stem.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Atomically replace a backing file with the given value table.
    pub async fn write_values(
        &self,
        stem: &str,
        values: &toml::Table,
    ) -> Result<(), PersistenceError> {
        let path = self.file_path(stem);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(values)?;
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        debug!(file = %path.display(), keys = values.len(), "backing file written");
        Ok(())
    }

    /// Read a backing file. A missing file is an empty value set, a file
    /// that exists but cannot be read or parsed is an error.
    pub async fn read_values(&self, stem: &str) -> Result<Option<toml::Table>, PersistenceError> {
        let path = self.file_path(stem);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let table: toml::Table = content.parse().map_err(|source| PersistenceError::Parse {
            file: path,
            source,
        })?;
        Ok(Some(table))
    }
}

/// Flatten the values of the subtree rooted at `backing_root` into the table
/// form stored in its backing file, skipping parameters owned by a nested
/// backing file.
pub fn collect_values(arena: &Arena, backing_root: NodeId) -> toml::Table {
    let mut table = toml::Table::new();
    for (relative, param_id) in arena.parameters_under(backing_root) {
        let owned_here = arena
            .owning_backing(param_id)
            .map(|(owner, _)| owner == backing_root)
            .unwrap_or(false);
        if !owned_here {
            continue;
        }
        if let Some(param) = arena.parameter(param_id) {
            table.insert(relative.dotted(), param.value().to_toml());
        }
    }
    table
}

/// Flatten a parsed backing file into dotted-path entries.
///
/// The writer emits flat quoted keys, but a hand-edited file may use nested
/// tables (`[greeting]` sections or unquoted dotted keys); both forms hydrate
/// identically.
pub fn flatten_values(table: &toml::Table) -> Vec<(String, toml::Value)> {
    fn walk(prefix: &str, table: &toml::Table, out: &mut Vec<(String, toml::Value)>) {
        for (key, value) in table {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            match value {
                toml::Value::Table(nested) => walk(&path, nested, out),
                other => out.push((path, other.clone())),
            }
        }
    }

    let mut out = Vec::new();
    walk("", table, &mut out);
    out
}

/// Map a backing-file value back into raw input for hydration.
pub fn toml_to_raw(value: &toml::Value) -> Option<RawValue> {
    match value {
        toml::Value::String(s) => Some(RawValue::Text(s.clone())),
        toml::Value::Integer(i) => Some(RawValue::Int(*i)),
        toml::Value::Float(f) => Some(RawValue::Float(*f)),
        toml::Value::Boolean(b) => Some(RawValue::Bool(*b)),
        toml::Value::Array(items) => items
            .iter()
            .map(toml_to_raw)
            .collect::<Option<Vec<_>>>()
            .map(RawValue::List),
        _ => None,
    }
}
