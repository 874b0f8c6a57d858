//! Concurrency facade over the settings tree
//!
//! Many logically independent tasks (one per inbound chat update or
//! marketplace event) hold the same `SettingsTree` handle and read or mutate
//! any reachable node between await points. The facade enforces the locking
//! discipline that keeps this safe:
//!
//! - a per-backing-file async lock is held across the whole
//!   convert → validate → commit → write pipeline of a persisting mutation,
//!   so two writers to the same file cannot interleave their write phases;
//! - in-memory-only mutations serialize on the arena write lock alone;
//! - shape mutations (`add_entry`/`remove_entry`) additionally serialize on a
//!   structure lock, since they change ordering, not just a leaf's value.
//!
//! Lock order is always file lock before arena lock, and no lock is ever held
//! across an await that takes the other in reverse, so the discipline cannot
//! deadlock. Cancellation after commit loses at most the best-effort
//! notification, never the committed value.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::convert::{ConversionError, ParamValue, RawValue};
use crate::notify::{ChangeNotifier, EventSink};
use crate::persist::{
    collect_values, flatten_values, toml_to_raw, LoadReport, PersistenceEngine, PersistenceError,
    SaveScope,
};
use crate::schema::{PluginSchema, SchemaNode};
use crate::tree::arena::{Arena, Node, NodeId};
use crate::tree::assembler::{instantiate_schema, SchemaError, TreeAssembler};
use crate::tree::parameter::{ParamError, Parameter, ValidationError};
use crate::tree::path::NodePath;
use crate::tree::{NodeKind, TreeError};

/// Any failure a settings operation can surface to a request handler.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<ParamError> for SettingsError {
    fn from(err: ParamError) -> Self {
        match err {
            ParamError::Conversion(e) => SettingsError::Conversion(e),
            ParamError::Validation(e) => SettingsError::Validation(e),
        }
    }
}

/// One row of a container listing, pre-rendered for the menu UI.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Rendered (and possibly redacted) value; `None` for sections.
    pub value: Option<String>,
    pub path: NodePath,
}

struct SharedTree {
    arena: RwLock<Arena>,
    /// Serializes shape mutations (entry addition/removal).
    structure: Mutex<()>,
    persist: PersistenceEngine,
    notifier: ChangeNotifier,
}

/// Shared handle to the live settings tree. Cheap to clone; every clone
/// addresses the same tree.
#[derive(Clone)]
pub struct SettingsTree {
    inner: Arc<SharedTree>,
}

impl SettingsTree {
    pub fn new(arena: Arena, persist: PersistenceEngine, sink: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Arc::new(SharedTree {
                arena: RwLock::new(arena),
                structure: Mutex::new(()),
                persist,
                notifier: ChangeNotifier::new(sink),
            }),
        }
    }

    /// Assemble the core schema plus plugin grafts and wrap the result.
    ///
    /// Rejected plugins are returned for reporting; the tree is complete and
    /// usable regardless.
    pub fn assemble(
        core: &SchemaNode,
        plugins: &[PluginSchema],
        persist: PersistenceEngine,
        sink: Arc<dyn EventSink>,
    ) -> Result<(Self, Vec<SchemaError>), SchemaError> {
        let assembler = TreeAssembler::new().map_err(|err| SchemaError::InvalidDescriptor {
            plugin_id: "core".to_string(),
            reason: err.to_string(),
        })?;
        let report = assembler.assemble(core, plugins)?;
        Ok((
            Self::new(report.arena, persist, sink),
            report.rejected,
        ))
    }

    pub fn config_dir(&self) -> &Path {
        self.inner.persist.config_dir()
    }

    /// Last committed value of the parameter at `path`.
    pub async fn get(&self, path: &NodePath) -> Result<ParamValue, SettingsError> {
        let arena = self.inner.arena.read().await;
        let id = arena.resolve_path(path)?;
        let param = arena
            .parameter(id)
            .ok_or_else(|| TreeError::WrongNodeKind { path: path.clone() })?;
        Ok(param.value().clone())
    }

    /// Convert, validate, commit and (optionally) persist a raw input.
    ///
    /// With `persist` the owning file's lock is held across the entire
    /// pipeline; concurrent writers to the same file queue up behind it and
    /// the file always contains one well-formed value set.
    pub async fn set_value(
        &self,
        path: &NodePath,
        raw: impl Into<RawValue>,
        persist: bool,
    ) -> Result<(), SettingsError> {
        let raw = raw.into();
        self.mutate(path, persist, move |param| param.apply_raw(&raw))
            .await
    }

    /// Select a choice option by index.
    pub async fn select(
        &self,
        path: &NodePath,
        index: usize,
        persist: bool,
    ) -> Result<(), SettingsError> {
        self.mutate(path, persist, move |param| param.select(index))
            .await
    }

    /// Restore a parameter to its default through the normal commit pipeline.
    pub async fn reset(&self, path: &NodePath, persist: bool) -> Result<(), SettingsError> {
        self.mutate(path, persist, |param| param.reset()).await
    }

    async fn mutate<F>(&self, path: &NodePath, persist: bool, op: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut Parameter) -> Result<(ParamValue, ParamValue), ParamError>,
    {
        // Locate the owning file first; no lock is held across this await
        // boundary and the node is re-resolved once the file lock is ours.
        let owning = {
            let arena = self.inner.arena.read().await;
            let id = arena.resolve_path(path)?;
            if arena.parameter(id).is_none() {
                return Err(TreeError::WrongNodeKind { path: path.clone() }.into());
            }
            arena.owning_backing(id)
        };

        match owning {
            Some((_, stem)) if persist => {
                let lock = self.inner.persist.file_lock(&stem);
                let _file_guard = lock.lock().await;

                let (old, new, sensitive, values) = {
                    let mut arena = self.inner.arena.write().await;
                    let id = arena.resolve_path(path)?;
                    let param = arena
                        .parameter_mut(id)
                        .ok_or_else(|| TreeError::WrongNodeKind { path: path.clone() })?;
                    let (old, new) = op(param)?;
                    let sensitive = param.sensitive;
                    // The shape may have changed while we queued for the file
                    // lock; only write when the node still belongs to it.
                    let values = match arena.owning_backing(id) {
                        Some((owner, owner_stem)) if owner_stem == stem => {
                            Some(collect_values(&arena, owner))
                        }
                        _ => None,
                    };
                    (old, new, sensitive, values)
                };

                // Commit already happened; a failed write surfaces to the
                // caller but leaves the in-memory value standing.
                let written = match values {
                    Some(values) => self.inner.persist.write_values(&stem, &values).await,
                    None => Ok(()),
                };
                self.notify_value_changed(path, old, new, sensitive);
                written?;
            }
            _ => {
                if persist {
                    debug!(path = %path, "no owning backing file, committing in memory only");
                }
                let (old, new, sensitive) = {
                    let mut arena = self.inner.arena.write().await;
                    let id = arena.resolve_path(path)?;
                    let param = arena
                        .parameter_mut(id)
                        .ok_or_else(|| TreeError::WrongNodeKind { path: path.clone() })?;
                    let (old, new) = op(param)?;
                    (old, new, param.sensitive)
                };
                self.notify_value_changed(path, old, new, sensitive);
            }
        }
        Ok(())
    }

    fn notify_value_changed(
        &self,
        path: &NodePath,
        old: ParamValue,
        new: ParamValue,
        sensitive: bool,
    ) {
        let redacted = "\u{2022}\u{2022}\u{2022}";
        let (old, new) = if sensitive {
            (redacted.to_string(), redacted.to_string())
        } else {
            (old.render(), new.render())
        };
        self.inner.notifier.value_changed(path.clone(), old, new);
    }

    /// Instantiate a descriptor as a new entry of the container at `parent`.
    ///
    /// Fails with `DuplicateId` when the id is taken and `overwrite` is
    /// false; emits a node-attached notification on success.
    pub async fn add_entry(
        &self,
        parent: &NodePath,
        schema: &SchemaNode,
        overwrite: bool,
    ) -> Result<NodePath, SettingsError> {
        let _structure = self.inner.structure.lock().await;
        let (new_path, kind) = {
            let mut arena = self.inner.arena.write().await;
            let parent_id = arena.resolve_path(parent)?;
            if arena.node(parent_id).is_some_and(|n| !n.is_group()) {
                return Err(TreeError::WrongNodeKind {
                    path: parent.clone(),
                }
                .into());
            }
            if arena.child_by_id(parent_id, schema.id()).is_some() {
                if overwrite {
                    arena.detach(parent_id, schema.id());
                } else {
                    return Err(TreeError::DuplicateId {
                        id: schema.id().to_string(),
                    }
                    .into());
                }
            }
            let id = instantiate_schema(&mut arena, parent_id, schema)?;
            let kind = if arena.node(id).is_some_and(Node::is_group) {
                NodeKind::Section
            } else {
                NodeKind::Parameter
            };
            (arena.path_of(id), kind)
        };
        self.inner.notifier.node_attached(new_path.clone(), kind);
        Ok(new_path)
    }

    /// Remove the entry named `local_id` from the container at `parent`.
    /// A no-op when no such entry exists.
    pub async fn remove_entry(
        &self,
        parent: &NodePath,
        local_id: &str,
    ) -> Result<(), SettingsError> {
        let _structure = self.inner.structure.lock().await;
        let mut arena = self.inner.arena.write().await;
        let parent_id = arena.resolve_path(parent)?;
        if arena.detach(parent_id, local_id).is_none() {
            debug!(parent = %parent, id = local_id, "remove_entry: no such entry");
        }
        Ok(())
    }

    /// Create an auto-response rule entry under `autoresponse.<rule_id>`.
    pub async fn add_auto_response(&self, rule_id: &str) -> Result<NodePath, SettingsError> {
        self.add_entry(
            &NodePath::from(["autoresponse"]),
            &crate::schema::core::auto_response_entry(rule_id),
            false,
        )
        .await
    }

    /// Create a notification target for a `{chat_id, thread_id}` pair,
    /// returning its composite entry key.
    pub async fn add_notification_target(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
    ) -> Result<String, SettingsError> {
        self.add_entry(
            &NodePath::from(["notifications"]),
            &crate::schema::core::notification_target_entry(chat_id, thread_id),
            false,
        )
        .await?;
        Ok(crate::schema::core::notification_target_key(
            chat_id, thread_id,
        ))
    }

    /// Ordered listing of the container at `path` for menu rendering.
    pub async fn snapshot(&self, path: &NodePath) -> Result<Vec<EntrySnapshot>, SettingsError> {
        let arena = self.inner.arena.read().await;
        let id = arena.resolve_path(path)?;
        if arena.node(id).is_some_and(|n| !n.is_group()) {
            return Err(TreeError::WrongNodeKind { path: path.clone() }.into());
        }

        let mut rows = Vec::new();
        for &child in arena.entries(id) {
            let Some(node) = arena.node(child) else {
                continue;
            };
            let (kind, value) = match arena.parameter(child) {
                Some(param) => (NodeKind::Parameter, Some(param.render_value())),
                None => (NodeKind::Section, None),
            };
            rows.push(EntrySnapshot {
                id: node.meta.id.clone(),
                name: node.meta.name.clone(),
                kind,
                value,
                path: arena.path_of(child),
            });
        }
        Ok(rows)
    }

    /// Serialize the subtree at `path` to its backing file(s).
    pub async fn save(&self, path: &NodePath, scope: SaveScope) -> Result<(), SettingsError> {
        let targets: Vec<(NodeId, String)> = {
            let arena = self.inner.arena.read().await;
            let id = arena.resolve_path(path)?;
            match scope {
                SaveScope::OwningFileOnly => arena.owning_backing(id).into_iter().collect(),
                SaveScope::WholeTree => arena.backing_roots_under(id),
            }
        };
        if targets.is_empty() {
            debug!(path = %path, "save: no backing files under node");
        }
        for (root_id, stem) in targets {
            self.write_backing(root_id, &stem).await?;
        }
        Ok(())
    }

    async fn write_backing(&self, root_id: NodeId, stem: &str) -> Result<(), SettingsError> {
        let lock = self.inner.persist.file_lock(stem);
        let _file_guard = lock.lock().await;
        let values = {
            let arena = self.inner.arena.read().await;
            // The subtree may have been removed while we queued for the lock.
            if arena.node(root_id).is_none() {
                return Ok(());
            }
            collect_values(&arena, root_id)
        };
        self.inner.persist.write_values(stem, &values).await?;
        Ok(())
    }

    /// Hydrate persisted values onto the assembled shape.
    ///
    /// Initialization, not mutation: no change notifications are emitted.
    /// Unknown file keys are ignored, schema paths absent from the files keep
    /// their defaults, and a present-but-unreadable backing file is fatal.
    pub async fn load(&self) -> Result<LoadReport, SettingsError> {
        let roots: Vec<(NodeId, String)> = {
            let arena = self.inner.arena.read().await;
            arena.backing_roots_under(arena.root())
        };

        let mut report = LoadReport::default();
        for (root_id, stem) in roots {
            let Some(table) = self.inner.persist.read_values(&stem).await? else {
                continue;
            };
            let mut arena = self.inner.arena.write().await;
            for (dotted, value) in flatten_values(&table) {
                let relative = NodePath::parse_dotted(&dotted);
                let Ok(id) = arena.resolve(root_id, relative.segments()) else {
                    debug!(file = %stem, key = %dotted, "ignoring unknown persisted key");
                    report.unknown += 1;
                    continue;
                };
                let Some(param) = arena.parameter_mut(id) else {
                    debug!(file = %stem, key = %dotted, "persisted key names a section");
                    report.unknown += 1;
                    continue;
                };
                let Some(raw) = toml_to_raw(&value) else {
                    warn!(file = %stem, key = %dotted, "unsupported persisted value shape");
                    report.invalid += 1;
                    continue;
                };
                match param.apply_raw(&raw) {
                    Ok(_) => report.hydrated += 1,
                    Err(err) => {
                        warn!(file = %stem, key = %dotted, error = %err, "persisted value rejected, keeping default");
                        report.invalid += 1;
                    }
                }
            }
        }
        info!(
            hydrated = report.hydrated,
            unknown = report.unknown,
            invalid = report.invalid,
            "settings hydrated"
        );
        Ok(report)
    }

    /// Entry ids recorded in the backing file of the container at `path`.
    ///
    /// Used to re-create dynamic entries (auto-response rules, notification
    /// targets) before hydration; `load` itself never creates structure.
    pub async fn saved_entry_ids(&self, path: &NodePath) -> Result<Vec<String>, SettingsError> {
        let stem = {
            let arena = self.inner.arena.read().await;
            let id = arena.resolve_path(path)?;
            match arena.owning_backing(id) {
                Some((owner, stem)) if owner == id => stem,
                _ => return Ok(Vec::new()),
            }
        };
        let Some(table) = self.inner.persist.read_values(&stem).await? else {
            return Ok(Vec::new());
        };

        let mut ids = Vec::new();
        for (dotted, _) in flatten_values(&table) {
            let first = dotted.split('.').next().unwrap_or_default().to_string();
            if !first.is_empty() && !ids.contains(&first) {
                ids.push(first);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::EventBus;
    use crate::schema::core::core_schema;
    use crate::schema::FieldSpec;
    use tempfile::TempDir;

    fn tree_in(dir: &TempDir) -> SettingsTree {
        let (tree, rejected) = SettingsTree::assemble(
            &core_schema(),
            &[],
            PersistenceEngine::new(dir.path().to_path_buf()),
            Arc::new(EventBus::default()),
        )
        .unwrap();
        assert!(rejected.is_empty());
        tree
    }

    #[tokio::test]
    async fn set_value_commits_and_persists() {
        let dir = TempDir::new().unwrap();
        let tree = tree_in(&dir);
        let path = NodePath::from(["marketplace", "refresh_minutes"]);

        tree.set_value(&path, "42", true).await.unwrap();
        assert_eq!(tree.get(&path).await.unwrap(), ParamValue::Int(42));

        let content =
            std::fs::read_to_string(dir.path().join("marketplace.toml")).unwrap();
        assert!(content.contains("refresh_minutes = 42"));
    }

    #[tokio::test]
    async fn failed_set_value_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let tree = tree_in(&dir);
        let path = NodePath::from(["marketplace", "refresh_minutes"]);
        tree.set_value(&path, "60", true).await.unwrap();
        let before = std::fs::read(dir.path().join("marketplace.toml")).unwrap();

        let err = tree.set_value(&path, "99999", true).await.unwrap_err();
        assert!(matches!(err, SettingsError::Validation(_)));
        let err = tree.set_value(&path, "banana", true).await.unwrap_err();
        assert!(matches!(err, SettingsError::Conversion(_)));

        assert_eq!(tree.get(&path).await.unwrap(), ParamValue::Int(60));
        let after = std::fs::read(dir.path().join("marketplace.toml")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn resolve_errors_are_typed() {
        let dir = TempDir::new().unwrap();
        let tree = tree_in(&dir);

        let missing = tree.get(&NodePath::from(["telegram", "nope"])).await;
        assert!(matches!(
            missing,
            Err(SettingsError::Tree(TreeError::PathNotFound { .. }))
        ));

        let through_leaf = tree
            .get(&NodePath::from(["telegram", "api_id", "x"]))
            .await;
        assert!(matches!(
            through_leaf,
            Err(SettingsError::Tree(TreeError::WrongNodeKind { .. }))
        ));
    }

    #[tokio::test]
    async fn add_entry_duplicate_and_overwrite() {
        let dir = TempDir::new().unwrap();
        let tree = tree_in(&dir);
        let parent = NodePath::from(["autoresponse"]);

        tree.add_auto_response("greeting").await.unwrap();
        let err = tree.add_auto_response("greeting").await.unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Tree(TreeError::DuplicateId { .. })
        ));

        tree.set_value(
            &parent.join("greeting").join("response_text"),
            "hello!",
            false,
        )
        .await
        .unwrap();
        // Overwriting replaces the entry wholesale, defaults included.
        tree.add_entry(
            &parent,
            &crate::schema::core::auto_response_entry("greeting"),
            true,
        )
        .await
        .unwrap();
        assert_eq!(
            tree.get(&parent.join("greeting").join("response_text"))
                .await
                .unwrap(),
            ParamValue::Text(String::new())
        );
    }

    #[tokio::test]
    async fn remove_entry_is_silent_on_absence() {
        let dir = TempDir::new().unwrap();
        let tree = tree_in(&dir);
        tree.remove_entry(&NodePath::from(["autoresponse"]), "ghost")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn snapshot_preserves_order_and_redacts() {
        let dir = TempDir::new().unwrap();
        let tree = tree_in(&dir);
        tree.set_value(
            &NodePath::from(["telegram", "bot_token"]),
            "123456789:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            false,
        )
        .await
        .unwrap();

        let rows = tree.snapshot(&NodePath::from(["telegram"])).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            ["bot_token", "api_id", "api_hash", "owner_chat_id", "session_name"]
        );
        assert_eq!(rows[0].value.as_deref(), Some("\u{2022}\u{2022}\u{2022}"));
    }

    #[tokio::test]
    async fn owning_file_scope_leaves_other_files_alone() {
        let dir = TempDir::new().unwrap();
        let tree = tree_in(&dir);

        tree.set_value(&NodePath::from(["hub", "instance_name"]), "prod", true)
            .await
            .unwrap();
        assert!(dir.path().join("hub.toml").exists());

        let key = tree.add_notification_target(111, None).await.unwrap();
        assert_eq!(key, "111_None");
        tree.save(&NodePath::from(["notifications"]), SaveScope::OwningFileOnly)
            .await
            .unwrap();

        assert!(dir.path().join("notifications.toml").exists());
        // Only the notifications file was written by the scoped save.
        assert!(!dir.path().join("marketplace.toml").exists());
        assert!(!dir.path().join("telegram.toml").exists());
    }

    #[tokio::test]
    async fn in_memory_mutation_skips_disk() {
        let dir = TempDir::new().unwrap();
        let tree = tree_in(&dir);
        tree.set_value(&NodePath::from(["marketplace", "enabled"]), "off", false)
            .await
            .unwrap();
        assert_eq!(
            tree.get(&NodePath::from(["marketplace", "enabled"]))
                .await
                .unwrap(),
            ParamValue::Toggle(false)
        );
        assert!(!dir.path().join("marketplace.toml").exists());
    }

    #[tokio::test]
    async fn select_persists_choice() {
        let dir = TempDir::new().unwrap();
        let tree = tree_in(&dir);
        let path = NodePath::from(["marketplace", "channel"]);

        tree.select(&path, 1, true).await.unwrap();
        assert_eq!(
            tree.get(&path).await.unwrap(),
            ParamValue::Choice("beta".to_string())
        );

        let err = tree.select(&path, 5, true).await.unwrap_err();
        assert!(matches!(err, SettingsError::Validation(_)));
        assert_eq!(
            tree.get(&path).await.unwrap(),
            ParamValue::Choice("beta".to_string())
        );
    }

    #[tokio::test]
    async fn plugin_parameters_persist_under_plugins_dir() {
        let dir = TempDir::new().unwrap();
        let plugin = PluginSchema::new(
            "chat_sync",
            SchemaNode::group(
                "chat_sync",
                "Chat sync",
                vec![SchemaNode::Field(FieldSpec::int("interval", "Interval", 60))],
            ),
        );
        let (tree, rejected) = SettingsTree::assemble(
            &core_schema(),
            &[plugin],
            PersistenceEngine::new(dir.path().to_path_buf()),
            Arc::new(EventBus::default()),
        )
        .unwrap();
        assert!(rejected.is_empty());

        tree.set_value(
            &NodePath::from(["plugins", "chat_sync", "interval"]),
            "30",
            true,
        )
        .await
        .unwrap();
        assert!(dir.path().join("plugins").join("chat_sync.toml").exists());
    }
}
