//! Declarative schema descriptors
//!
//! Plugins and the core alike describe their settings as plain data: a tree
//! of group and field descriptors. The host validates a descriptor up front
//! and instantiates it into arena nodes, so no runtime reflection is involved
//! and a graft can be made all-or-nothing.

pub mod core;

use crate::convert::{ParamKind, ParamValue};
use crate::tree::{Parameter, Validator};

/// Leaf descriptor: everything needed to instantiate one parameter.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: ParamKind,
    pub default: ParamValue,
    /// Fixed ordered option set, choice fields only.
    pub options: Vec<String>,
    pub validators: Vec<Validator>,
    pub sensitive: bool,
}

impl FieldSpec {
    fn new(id: &str, name: &str, kind: ParamKind, default: ParamValue) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            kind,
            default,
            options: Vec::new(),
            validators: Vec::new(),
            sensitive: false,
        }
    }

    pub fn toggle(id: &str, name: &str, default: bool) -> Self {
        Self::new(id, name, ParamKind::Toggle, ParamValue::Toggle(default))
    }

    pub fn text(id: &str, name: &str, default: &str) -> Self {
        Self::new(id, name, ParamKind::Text, ParamValue::Text(default.to_string()))
    }

    pub fn int(id: &str, name: &str, default: i64) -> Self {
        Self::new(id, name, ParamKind::Int, ParamValue::Int(default))
    }

    pub fn float(id: &str, name: &str, default: f64) -> Self {
        Self::new(id, name, ParamKind::Float, ParamValue::Float(default))
    }

    pub fn list(id: &str, name: &str) -> Self {
        Self::new(id, name, ParamKind::List, ParamValue::List(Vec::new()))
    }

    pub fn choice(id: &str, name: &str, options: &[&str], default_index: usize) -> Self {
        let options: Vec<String> = options.iter().map(|s| s.to_string()).collect();
        let default = ParamValue::Choice(options[default_index].clone());
        let mut spec = Self::new(id, name, ParamKind::Choice, default);
        spec.options = options;
        spec
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Build the runtime parameter this descriptor describes.
    pub fn instantiate(&self) -> Parameter {
        let mut param = if self.kind == ParamKind::Choice {
            let index = self
                .options
                .iter()
                .position(|o| ParamValue::Choice(o.clone()) == self.default)
                .unwrap_or(0);
            Parameter::choice(self.options.clone(), index)
        } else {
            Parameter::new(self.kind, self.default.clone(), Vec::new())
        };
        param.validators.extend(self.validators.iter().cloned());
        param.sensitive = self.sensitive;
        param
    }
}

/// One node of a schema descriptor tree.
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Group {
        id: String,
        name: String,
        description: String,
        /// Backing file stem owning the subtree, when this group is a
        /// persistence root.
        backing: Option<String>,
        children: Vec<SchemaNode>,
    },
    Field(FieldSpec),
}

impl SchemaNode {
    pub fn group(id: &str, name: &str, children: Vec<SchemaNode>) -> Self {
        SchemaNode::Group {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            backing: None,
            children,
        }
    }

    /// Group that owns its own backing file.
    pub fn backed_group(id: &str, name: &str, backing: &str, children: Vec<SchemaNode>) -> Self {
        SchemaNode::Group {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            backing: Some(backing.to_string()),
            children,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SchemaNode::Group { id, .. } => id,
            SchemaNode::Field(field) => &field.id,
        }
    }
}

/// What a plugin hands the host at setup time: a mount id and a data-only
/// subtree descriptor. The tree assembler is the only consumer.
#[derive(Debug, Clone)]
pub struct PluginSchema {
    /// Reserved mount segment under `plugins.<plugin_id>`.
    pub plugin_id: String,
    /// Descriptor root; must be a group.
    pub schema: SchemaNode,
}

impl PluginSchema {
    pub fn new(plugin_id: &str, schema: SchemaNode) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            schema,
        }
    }
}
