//! The live settings tree
//!
//! Every user-facing setting is a typed node in one hierarchical tree that is
//! shared, process-wide, by all request handlers. This module holds the node
//! data model (arena, containers, parameters), path resolution, assembly and
//! plugin grafting, and the concurrency facade the rest of the daemon talks
//! to.

pub mod arena;
pub mod assembler;
pub mod parameter;
pub mod path;
pub mod settings;

pub use arena::{Arena, Node, NodeBody, NodeId, NodeMeta, Properties};
pub use assembler::{instantiate_schema, AssemblyReport, SchemaError, TreeAssembler};
pub use parameter::{ParamError, Parameter, ValidationError, Validator};
pub use path::NodePath;
pub use settings::{EntrySnapshot, SettingsError, SettingsTree};

use thiserror::Error;

/// Node variant discriminator used in snapshots and change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Container of further nodes
    Section,
    /// Typed leaf value
    Parameter,
}

/// Path resolution or structural failure, surfaced to the UI layer as
/// "no such setting".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("no such setting: {path}")]
    PathNotFound { path: NodePath },

    #[error("{path} does not name a settings section")]
    WrongNodeKind { path: NodePath },

    #[error("duplicate entry id: {id}")]
    DuplicateId { id: String },
}
