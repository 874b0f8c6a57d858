//! Arena storage for the settings tree
//!
//! The tree is a parent/child graph, so child nodes are owned by a flat arena
//! and addressed by stable `NodeId`s instead of back-references. A node keeps
//! its parent's id; paths are recomputed by walking parent ids, which keeps
//! ownership single-direction and lets containers hold plain id lists.

use crate::convert::ParamKind;
use crate::tree::parameter::Parameter;
use crate::tree::path::NodePath;
use crate::tree::TreeError;

/// Stable handle of a node inside one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// Identity and human-readable metadata shared by both node variants.
#[derive(Debug, Clone)]
pub struct NodeMeta {
    /// Local id, unique within the parent container.
    pub id: String,
    /// Human-readable name for menus.
    pub name: String,
    /// Longer description for help surfaces.
    pub description: String,
}

impl NodeMeta {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Container node: ordered child ids plus persistence ownership.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: Vec<NodeId>,
    /// Backing file stem owning this subtree, e.g. `"notifications"`.
    /// Subtrees without one persist into the nearest owning ancestor's file.
    pub backing: Option<String>,
}

impl Properties {
    /// Container owning the backing file `stem`.
    pub fn with_backing(stem: &str) -> Self {
        Self {
            entries: Vec::new(),
            backing: Some(stem.to_string()),
        }
    }

    /// Read-only ordered view of child ids, insertion order preserved.
    pub fn entries(&self) -> &[NodeId] {
        &self.entries
    }
}

/// Node variant payload.
#[derive(Debug, Clone)]
pub enum NodeBody {
    Group(Properties),
    Leaf(Parameter),
}

/// A settings tree node.
#[derive(Debug, Clone)]
pub struct Node {
    pub meta: NodeMeta,
    pub parent: Option<NodeId>,
    pub body: NodeBody,
}

impl Node {
    pub fn is_group(&self) -> bool {
        matches!(self.body, NodeBody::Group(_))
    }

    /// Parameter kind for leaves, `None` for groups.
    pub fn param_kind(&self) -> Option<ParamKind> {
        match &self.body {
            NodeBody::Leaf(param) => Some(param.kind),
            NodeBody::Group(_) => None,
        }
    }
}

/// Owner of every node in one settings tree.
///
/// Slots of removed nodes stay vacant; ids are never reused within a process,
/// so a stale id can only miss, not alias a different node.
#[derive(Debug)]
pub struct Arena {
    slots: Vec<Option<Node>>,
    root: NodeId,
}

impl Arena {
    /// Create an arena holding a single root container.
    pub fn new(meta: NodeMeta) -> Self {
        let root = Node {
            meta,
            parent: None,
            body: NodeBody::Group(Properties::default()),
        };
        Self {
            slots: vec![Some(root)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Leaf accessor; `None` when the id is vacant or names a group.
    pub fn parameter(&self, id: NodeId) -> Option<&Parameter> {
        match &self.node(id)?.body {
            NodeBody::Leaf(param) => Some(param),
            NodeBody::Group(_) => None,
        }
    }

    pub fn parameter_mut(&mut self, id: NodeId) -> Option<&mut Parameter> {
        match &mut self.node_mut(id)?.body {
            NodeBody::Leaf(param) => Some(param),
            NodeBody::Group(_) => None,
        }
    }

    fn group(&self, id: NodeId) -> Option<&Properties> {
        match &self.node(id)?.body {
            NodeBody::Group(props) => Some(props),
            NodeBody::Leaf(_) => None,
        }
    }

    fn group_mut(&mut self, id: NodeId) -> Option<&mut Properties> {
        match &mut self.node_mut(id)?.body {
            NodeBody::Group(props) => Some(props),
            NodeBody::Leaf(_) => None,
        }
    }

    /// Ordered child ids of a container.
    pub fn entries(&self, id: NodeId) -> &[NodeId] {
        self.group(id).map(Properties::entries).unwrap_or(&[])
    }

    /// Recompute a node's path by walking parent ids up to the root.
    pub fn path_of(&self, id: NodeId) -> NodePath {
        let mut segments = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.node(current) else { break };
            if node.parent.is_some() {
                segments.push(node.meta.id.clone());
            }
            cursor = node.parent;
        }
        segments.reverse();
        NodePath::from_segments(segments)
    }

    /// Find a direct child of `parent` by local id.
    pub fn child_by_id(&self, parent: NodeId, local_id: &str) -> Option<NodeId> {
        self.entries(parent)
            .iter()
            .copied()
            .find(|&child| self.node(child).is_some_and(|n| n.meta.id == local_id))
    }

    /// Walk `segments` child-by-child starting at `from`.
    ///
    /// Fails with `PathNotFound` when a segment is absent and with
    /// `WrongNodeKind` when a non-terminal segment names a parameter.
    pub fn resolve(&self, from: NodeId, segments: &[String]) -> Result<NodeId, TreeError> {
        let mut cursor = from;
        for (depth, segment) in segments.iter().enumerate() {
            let node = self.node(cursor).ok_or_else(|| TreeError::PathNotFound {
                path: NodePath::from_segments(segments[..depth].to_vec()),
            })?;
            if !node.is_group() {
                return Err(TreeError::WrongNodeKind {
                    path: self.path_of(cursor),
                });
            }
            cursor = self.child_by_id(cursor, segment).ok_or_else(|| {
                TreeError::PathNotFound {
                    path: self.path_of(cursor).join(segment),
                }
            })?;
        }
        Ok(cursor)
    }

    /// Resolve a path from the root.
    pub fn resolve_path(&self, path: &NodePath) -> Result<NodeId, TreeError> {
        self.resolve(self.root, path.segments())
    }

    /// Attach a new node under `parent`, keeping local ids unique and
    /// appending to the ordered entries.
    pub fn attach(
        &mut self,
        parent: NodeId,
        meta: NodeMeta,
        body: NodeBody,
    ) -> Result<NodeId, TreeError> {
        if self.group(parent).is_none() {
            return Err(TreeError::WrongNodeKind {
                path: self.path_of(parent),
            });
        }
        if self.child_by_id(parent, &meta.id).is_some() {
            return Err(TreeError::DuplicateId { id: meta.id });
        }

        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Some(Node {
            meta,
            parent: Some(parent),
            body,
        }));
        self.group_mut(parent)
            .expect("parent checked as group above")
            .entries
            .push(id);
        Ok(id)
    }

    /// Detach the child named `local_id` and free its whole subtree.
    ///
    /// Returns the removed id, or `None` when no such child exists.
    pub fn detach(&mut self, parent: NodeId, local_id: &str) -> Option<NodeId> {
        let child = self.child_by_id(parent, local_id)?;
        self.group_mut(parent)?.entries.retain(|&id| id != child);
        for id in self.descendants(child) {
            self.slots[id.0 as usize] = None;
        }
        Some(child)
    }

    /// Pre-order traversal of the subtree rooted at `id` (inclusive).
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.node(current).is_none() {
                continue;
            }
            out.push(current);
            let children = self.entries(current);
            for &child in children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Nearest ancestor-or-self container owning a backing file.
    pub fn owning_backing(&self, id: NodeId) -> Option<(NodeId, String)> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current)?;
            if let NodeBody::Group(props) = &node.body {
                if let Some(stem) = &props.backing {
                    return Some((current, stem.clone()));
                }
            }
            cursor = node.parent;
        }
        None
    }

    /// All backing-file roots inside the subtree at `id` (inclusive).
    pub fn backing_roots_under(&self, id: NodeId) -> Vec<(NodeId, String)> {
        self.descendants(id)
            .into_iter()
            .filter_map(|node_id| {
                let node = self.node(node_id)?;
                match &node.body {
                    NodeBody::Group(props) => props
                        .backing
                        .as_ref()
                        .map(|stem| (node_id, stem.clone())),
                    NodeBody::Leaf(_) => None,
                }
            })
            .collect()
    }

    /// Parameters inside the subtree at `root`, with paths relative to it.
    pub fn parameters_under(&self, root: NodeId) -> Vec<(NodePath, NodeId)> {
        let base = self.path_of(root);
        self.descendants(root)
            .into_iter()
            .filter(|&id| self.parameter(id).is_some())
            .filter_map(|id| {
                let relative = self.path_of(id);
                relative
                    .strip_prefix(&base)
                    .map(|segments| (NodePath::from_segments(segments.to_vec()), id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ParamKind, ParamValue};

    fn leaf(default: i64) -> NodeBody {
        NodeBody::Leaf(Parameter::new(
            ParamKind::Int,
            ParamValue::Int(default),
            vec![],
        ))
    }

    fn group() -> NodeBody {
        NodeBody::Group(Properties::default())
    }

    fn arena_with_section() -> (Arena, NodeId) {
        let mut arena = Arena::new(NodeMeta::new("root", "Settings", ""));
        let section = arena
            .attach(arena.root(), NodeMeta::new("telegram", "Telegram", ""), group())
            .unwrap();
        (arena, section)
    }

    #[test]
    fn paths_walk_parent_ids() {
        let (mut arena, section) = arena_with_section();
        let param = arena
            .attach(section, NodeMeta::new("timeout", "Timeout", ""), leaf(30))
            .unwrap();

        assert_eq!(arena.path_of(arena.root()), NodePath::root());
        assert_eq!(arena.path_of(param), NodePath::from(["telegram", "timeout"]));
    }

    #[test]
    fn resolve_round_trips_every_node() {
        let (mut arena, section) = arena_with_section();
        let param = arena
            .attach(section, NodeMeta::new("timeout", "Timeout", ""), leaf(30))
            .unwrap();

        for id in [arena.root(), section, param] {
            let path = arena.path_of(id);
            assert_eq!(arena.resolve_path(&path).unwrap(), id);
        }
    }

    #[test]
    fn resolve_reports_missing_and_wrong_kind() {
        let (mut arena, section) = arena_with_section();
        arena
            .attach(section, NodeMeta::new("timeout", "Timeout", ""), leaf(30))
            .unwrap();

        let missing = arena.resolve_path(&NodePath::from(["telegram", "nope"]));
        assert!(matches!(missing, Err(TreeError::PathNotFound { .. })));

        let through_leaf = arena.resolve_path(&NodePath::from(["telegram", "timeout", "x"]));
        assert!(matches!(through_leaf, Err(TreeError::WrongNodeKind { .. })));
    }

    #[test]
    fn entries_keep_insertion_order() {
        let (mut arena, section) = arena_with_section();
        for id in ["c", "a", "b"] {
            arena
                .attach(section, NodeMeta::new(id, id, ""), leaf(0))
                .unwrap();
        }
        let order: Vec<String> = arena
            .entries(section)
            .iter()
            .map(|&id| arena.node(id).unwrap().meta.id.clone())
            .collect();
        assert_eq!(order, ["c", "a", "b"]);
    }

    #[test]
    fn duplicate_local_ids_rejected() {
        let (mut arena, section) = arena_with_section();
        arena
            .attach(section, NodeMeta::new("token", "Token", ""), leaf(0))
            .unwrap();
        let err = arena
            .attach(section, NodeMeta::new("token", "Token", ""), leaf(0))
            .unwrap_err();
        assert!(matches!(err, TreeError::DuplicateId { .. }));
    }

    #[test]
    fn detach_is_noop_when_absent_and_frees_subtree() {
        let (mut arena, section) = arena_with_section();
        let param = arena
            .attach(section, NodeMeta::new("timeout", "Timeout", ""), leaf(30))
            .unwrap();

        assert!(arena.detach(section, "missing").is_none());
        assert_eq!(arena.detach(section, "timeout"), Some(param));
        assert!(arena.node(param).is_none());
        assert!(arena.entries(section).is_empty());
    }

    #[test]
    fn owning_backing_walks_up() {
        let mut arena = Arena::new(NodeMeta::new("root", "Settings", ""));
        let section = arena
            .attach(
                arena.root(),
                NodeMeta::new("notifications", "Notifications", ""),
                NodeBody::Group(Properties::with_backing("notifications")),
            )
            .unwrap();
        let entry = arena
            .attach(section, NodeMeta::new("111_None", "Target", ""), group())
            .unwrap();
        let param = arena
            .attach(entry, NodeMeta::new("chat_id", "Chat", ""), leaf(111))
            .unwrap();

        let (owner, stem) = arena.owning_backing(param).unwrap();
        assert_eq!(owner, section);
        assert_eq!(stem, "notifications");
    }
}
