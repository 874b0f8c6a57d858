//! Tree assembly and plugin grafting
//!
//! The root tree is built once at startup from the static core schema, then
//! plugin-contributed descriptors are grafted under `plugins.<plugin_id>` in
//! load order. A descriptor is validated completely before it touches the
//! arena, so a graft either lands whole or not at all.

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::convert::ParamKind;
use crate::schema::core::{plugin_backing, PLUGINS_MOUNT};
use crate::schema::{FieldSpec, PluginSchema, SchemaNode};
use crate::tree::arena::{Arena, NodeBody, NodeId, NodeMeta, Properties};
use crate::tree::path::NodePath;
use crate::tree::TreeError;

/// Structural conflict or malformed descriptor during assembly.
///
/// Assembly-time failures are fatal to the offending plugin's contribution
/// only; the application continues with the rest of the tree.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("plugin {plugin_id}: invalid schema descriptor: {reason}")]
    InvalidDescriptor { plugin_id: String, reason: String },

    #[error("plugin {plugin_id}: mount id already taken at {path}")]
    Collision { plugin_id: String, path: NodePath },
}

/// Result of assembling the root tree.
pub struct AssemblyReport {
    pub arena: Arena,
    /// Plugins excluded from the tree, with the reason.
    pub rejected: Vec<SchemaError>,
}

/// Builds the root tree from the static core schema and plugin descriptors.
pub struct TreeAssembler {
    id_pattern: Regex,
}

impl TreeAssembler {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            id_pattern: Regex::new(r"^[A-Za-z0-9_-]+$")?,
        })
    }

    /// Assemble the core schema, then graft each plugin in load order.
    ///
    /// A malformed core schema is a hard error; a malformed or colliding
    /// plugin is reported in the returned `rejected` list and skipped.
    pub fn assemble(
        &self,
        core: &SchemaNode,
        plugins: &[PluginSchema],
    ) -> Result<AssemblyReport, SchemaError> {
        self.validate_node("core", core, true)?;

        let SchemaNode::Group {
            id,
            name,
            description,
            children,
            ..
        } = core
        else {
            return Err(SchemaError::InvalidDescriptor {
                plugin_id: "core".to_string(),
                reason: "core schema root must be a group".to_string(),
            });
        };

        let mut arena = Arena::new(NodeMeta::new(id, name, description));
        let root = arena.root();
        for child in children {
            instantiate_schema(&mut arena, root, child).map_err(|err| {
                SchemaError::InvalidDescriptor {
                    plugin_id: "core".to_string(),
                    reason: err.to_string(),
                }
            })?;
        }

        let mut rejected = Vec::new();
        for plugin in plugins {
            match self.graft(&mut arena, plugin) {
                Ok(mount) => {
                    debug!(plugin = %plugin.plugin_id, path = %arena.path_of(mount), "plugin schema grafted");
                }
                Err(err) => {
                    warn!(plugin = %plugin.plugin_id, error = %err, "plugin schema rejected");
                    rejected.push(err);
                }
            }
        }

        Ok(AssemblyReport { arena, rejected })
    }

    /// Mount one plugin subtree under `plugins.<plugin_id>`.
    fn graft(&self, arena: &mut Arena, plugin: &PluginSchema) -> Result<NodeId, SchemaError> {
        let plugin_id = plugin.plugin_id.as_str();
        if !self.id_pattern.is_match(plugin_id) {
            return Err(SchemaError::InvalidDescriptor {
                plugin_id: plugin_id.to_string(),
                reason: format!("mount id {:?} is not a valid id", plugin_id),
            });
        }
        self.validate_node(plugin_id, &plugin.schema, false)?;

        let SchemaNode::Group {
            name,
            description,
            children,
            ..
        } = &plugin.schema
        else {
            return Err(SchemaError::InvalidDescriptor {
                plugin_id: plugin_id.to_string(),
                reason: "plugin schema root must be a group".to_string(),
            });
        };

        let mount_path = NodePath::from([PLUGINS_MOUNT, plugin_id]);
        let plugins_root = arena
            .resolve_path(&NodePath::from([PLUGINS_MOUNT]))
            .map_err(|err| SchemaError::InvalidDescriptor {
                plugin_id: plugin_id.to_string(),
                reason: err.to_string(),
            })?;
        if arena.child_by_id(plugins_root, plugin_id).is_some() {
            return Err(SchemaError::Collision {
                plugin_id: plugin_id.to_string(),
                path: mount_path,
            });
        }

        let mount = arena
            .attach(
                plugins_root,
                NodeMeta::new(plugin_id, name, description),
                NodeBody::Group(Properties::with_backing(&plugin_backing(plugin_id))),
            )
            .map_err(|err| SchemaError::InvalidDescriptor {
                plugin_id: plugin_id.to_string(),
                reason: err.to_string(),
            })?;

        for child in children {
            if let Err(err) = instantiate_schema(arena, mount, child) {
                // Descriptor validation makes this unreachable, but never
                // leave a half-grafted mount behind.
                arena.detach(plugins_root, plugin_id);
                return Err(SchemaError::InvalidDescriptor {
                    plugin_id: plugin_id.to_string(),
                    reason: err.to_string(),
                });
            }
        }
        Ok(mount)
    }

    /// Validate one descriptor tree: well-formed ids, unique sibling ids,
    /// sane choice fields, matching default kinds. `allow_backing` is false
    /// for plugin descriptors, whose backing file is assigned by the host.
    fn validate_node(
        &self,
        plugin_id: &str,
        node: &SchemaNode,
        allow_backing: bool,
    ) -> Result<(), SchemaError> {
        let fail = |reason: String| SchemaError::InvalidDescriptor {
            plugin_id: plugin_id.to_string(),
            reason,
        };

        match node {
            SchemaNode::Group {
                id,
                backing,
                children,
                ..
            } => {
                if !self.id_pattern.is_match(id) {
                    return Err(fail(format!("group id {:?} is not a valid id", id)));
                }
                if !allow_backing && backing.is_some() {
                    return Err(fail(format!(
                        "group {:?} declares a backing file; plugin backing is host-assigned",
                        id
                    )));
                }
                let mut seen = std::collections::HashSet::new();
                for child in children {
                    if !seen.insert(child.id().to_string()) {
                        return Err(fail(format!("duplicate sibling id {:?}", child.id())));
                    }
                    self.validate_node(plugin_id, child, allow_backing)?;
                }
                Ok(())
            }
            SchemaNode::Field(field) => self.validate_field(plugin_id, field),
        }
    }

    fn validate_field(&self, plugin_id: &str, field: &FieldSpec) -> Result<(), SchemaError> {
        let fail = |reason: String| SchemaError::InvalidDescriptor {
            plugin_id: plugin_id.to_string(),
            reason,
        };

        if !self.id_pattern.is_match(&field.id) {
            return Err(fail(format!("field id {:?} is not a valid id", field.id)));
        }
        if field.kind == ParamKind::Choice {
            if field.options.is_empty() {
                return Err(fail(format!("choice field {:?} has no options", field.id)));
            }
            let default_listed = field
                .options
                .iter()
                .any(|o| crate::convert::ParamValue::Choice(o.clone()) == field.default);
            if !default_listed {
                return Err(fail(format!(
                    "choice field {:?} default is not one of its options",
                    field.id
                )));
            }
        } else if field.default.kind() != field.kind {
            return Err(fail(format!(
                "field {:?} default is a {} but the field is a {}",
                field.id,
                field.default.kind(),
                field.kind
            )));
        }
        Ok(())
    }
}

/// Instantiate one descriptor node under `parent`.
///
/// Also used for runtime-created dynamic entries, which go through the same
/// code path as assembly so ordering and uniqueness invariants match.
pub fn instantiate_schema(
    arena: &mut Arena,
    parent: NodeId,
    node: &SchemaNode,
) -> Result<NodeId, TreeError> {
    match node {
        SchemaNode::Group {
            id,
            name,
            description,
            backing,
            children,
        } => {
            let props = match backing {
                Some(stem) => Properties::with_backing(stem),
                None => Properties::default(),
            };
            let group = arena.attach(
                parent,
                NodeMeta::new(id, name, description),
                NodeBody::Group(props),
            )?;
            for child in children {
                instantiate_schema(arena, group, child)?;
            }
            Ok(group)
        }
        SchemaNode::Field(field) => arena.attach(
            parent,
            NodeMeta::new(&field.id, &field.name, &field.description),
            NodeBody::Leaf(field.instantiate()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::core::core_schema;
    use crate::schema::FieldSpec;

    fn plugin(id: &str) -> PluginSchema {
        PluginSchema::new(
            id,
            SchemaNode::group(
                id,
                "Chat sync",
                vec![
                    SchemaNode::Field(FieldSpec::toggle("enabled", "Enabled", false)),
                    SchemaNode::Field(FieldSpec::int("interval", "Interval", 60)),
                ],
            ),
        )
    }

    #[test]
    fn assembles_core_with_plugins() {
        let assembler = TreeAssembler::new().unwrap();
        let report = assembler
            .assemble(&core_schema(), &[plugin("chat_sync")])
            .unwrap();
        assert!(report.rejected.is_empty());

        let arena = report.arena;
        let mount = arena
            .resolve_path(&NodePath::from(["plugins", "chat_sync"]))
            .unwrap();
        let (_, stem) = arena.owning_backing(mount).unwrap();
        assert_eq!(stem, "plugins/chat_sync");
        arena
            .resolve_path(&NodePath::from(["plugins", "chat_sync", "interval"]))
            .unwrap();
    }

    #[test]
    fn colliding_mount_rejects_second_plugin_only() {
        let assembler = TreeAssembler::new().unwrap();
        let report = assembler
            .assemble(&core_schema(), &[plugin("chat_sync"), plugin("chat_sync")])
            .unwrap();

        assert_eq!(report.rejected.len(), 1);
        match &report.rejected[0] {
            SchemaError::Collision { plugin_id, path } => {
                assert_eq!(plugin_id, "chat_sync");
                assert_eq!(path, &NodePath::from(["plugins", "chat_sync"]));
            }
            other => panic!("expected collision, got {other:?}"),
        }

        // First mount and the core schema stay intact.
        let arena = report.arena;
        arena
            .resolve_path(&NodePath::from(["plugins", "chat_sync", "enabled"]))
            .unwrap();
        arena
            .resolve_path(&NodePath::from(["telegram", "bot_token"]))
            .unwrap();
    }

    #[test]
    fn malformed_descriptor_is_rejected_without_mounting() {
        let assembler = TreeAssembler::new().unwrap();
        let bad = PluginSchema::new(
            "broken",
            SchemaNode::group(
                "broken",
                "Broken",
                vec![
                    SchemaNode::Field(FieldSpec::toggle("x", "X", false)),
                    SchemaNode::Field(FieldSpec::toggle("x", "X again", true)),
                ],
            ),
        );
        let report = assembler.assemble(&core_schema(), &[bad]).unwrap();
        assert_eq!(report.rejected.len(), 1);
        assert!(report
            .arena
            .resolve_path(&NodePath::from(["plugins", "broken"]))
            .is_err());
    }

    #[test]
    fn plugin_declared_backing_is_refused() {
        let assembler = TreeAssembler::new().unwrap();
        let sneaky = PluginSchema::new(
            "sneaky",
            SchemaNode::backed_group("sneaky", "Sneaky", "telegram", Vec::new()),
        );
        let report = assembler.assemble(&core_schema(), &[sneaky]).unwrap();
        assert!(matches!(
            report.rejected[0],
            SchemaError::InvalidDescriptor { .. }
        ));
    }
}
