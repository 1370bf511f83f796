//! Shared types and errors for the Enro navigation core.
//!
//! This crate provides the foundational types used across all other Enro crates:
//! - `EnroError`: unified error taxonomy
//! - `NavigationKey` and its capability markers: "what to show"
//! - `NavigationKeyInstance`: a key plus a unique id and metadata
//! - `ContextId` / `ContainerKey` / `ResultId`: identifiers threaded through the tree

pub mod instance;
pub mod key;

pub use instance::{ContainerKey, InstanceId, InstanceMetadata, NavigationKeyInstance, ResultId};
pub use key::{
    AnyKey, NavigationDirection, NavigationKey, SupportsPresent, SupportsPush, WithResult,
};

use serde::{Deserialize, Serialize};

/// Arena handle for a node in the navigation context tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(u64);

impl ContextId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unified error type for all Enro subsystems.
#[derive(Debug, thiserror::Error)]
pub enum EnroError {
    // === Binding Errors ===
    #[error("No navigation binding registered for key type '{key_type}'")]
    MissingBinding { key_type: String },

    #[error("Duplicate navigation binding for key type '{key_type}'")]
    DuplicateBinding { key_type: String },

    #[error("No root host available to open key type '{key_type}'")]
    MissingRootHost { key_type: String },

    #[error("No container can host key type '{key_type}' from context {from}")]
    NoContainerFor { key_type: String, from: ContextId },

    // === Context Tree Errors ===
    #[error("Context {0} does not exist")]
    ContextNotFound(ContextId),

    #[error("Context {context} is not a {expected} context")]
    WrongContextKind {
        context: ContextId,
        expected: &'static str,
    },

    #[error("Context {child} is not a child of context {parent}")]
    NotAChild { parent: ContextId, child: ContextId },

    #[error("Container '{0}' is already registered")]
    DuplicateContainer(ContainerKey),

    #[error("Container '{0}' does not exist")]
    ContainerNotFound(ContainerKey),

    #[error("Instance {instance} is already present in the context tree")]
    DuplicateInstance { instance: InstanceId },

    #[error("Container '{container}' does not accept key type '{key_type}'")]
    RejectedByContainer {
        container: ContainerKey,
        key_type: String,
    },

    // === Key / Result Errors ===
    #[error("Expected key type '{expected}' but instance holds '{actual}'")]
    KeyTypeMismatch { expected: String, actual: String },

    #[error("Result channel {0} was closed before a result arrived")]
    ResultChannelClosed(ResultId),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl EnroError {
    /// Returns `true` for binding/configuration defects that can only be fixed
    /// by changing how the controller is wired.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            EnroError::MissingBinding { .. }
                | EnroError::DuplicateBinding { .. }
                | EnroError::MissingRootHost { .. }
                | EnroError::NoContainerFor { .. }
        )
    }

    /// The key type named by the error, if any.
    pub fn key_type(&self) -> Option<&str> {
        match self {
            EnroError::MissingBinding { key_type }
            | EnroError::DuplicateBinding { key_type }
            | EnroError::MissingRootHost { key_type }
            | EnroError::NoContainerFor { key_type, .. }
            | EnroError::RejectedByContainer { key_type, .. } => Some(key_type),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, EnroError>`.
pub type Result<T> = std::result::Result<T, EnroError>;
