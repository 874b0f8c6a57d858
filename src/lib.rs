//! chathub - Chat-Hub Daemon with a Live Settings Tree
//!
//! chathub keeps every user-facing setting (bot credentials, auto-response
//! rules, notification targets, plugin options) in a single typed, hierarchical
//! property tree that stays live while the daemon runs: request handlers
//! resolve a path, read or mutate a node, and the change is validated,
//! persisted and broadcast to subscribers without a restart.

pub mod cli;
pub mod convert;
pub mod logging;
pub mod notify;
pub mod persist;
pub mod schema;
pub mod tree;

pub use convert::{ParamKind, ParamValue, RawValue};
pub use tree::{NodePath, SettingsTree};

/// Result type alias for chathub operations
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to chathub operations
#[derive(thiserror::Error, Debug)]
pub enum ChatHubError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Settings error: {0}")]
    Settings(#[from] tree::SettingsError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] persist::PersistenceError),

    #[error("Schema error: {0}")]
    Schema(#[from] tree::SchemaError),
}
