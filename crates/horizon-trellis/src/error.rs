//! Error types for the form-model engine.

use horizon_trellis_core::{MalformedId, TreeError, XmlError};

use crate::load::LoadError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, TrellisError>;

/// Errors that can occur in the form-model engine.
///
/// Recoverable conditions (load failures, expression failures) are surfaced
/// as lifecycle events rather than errors; the variants here are either
/// precondition violations on the caller's side or failures escalated by an
/// event's default action.
#[derive(Debug, thiserror::Error)]
pub enum TrellisError {
    /// A resolution target was an effective or absolute id where a static id
    /// is required. This is a programming error, never coerced.
    #[error("Target id must be a static id: '{id}'")]
    TargetIdNotStatic { id: String },

    /// An instance id does not exist in the model's declaration.
    #[error("Unknown instance id '{id}' in model '{model}'")]
    UnknownInstanceId { id: String, model: String },

    /// A model handle does not name a model of the document.
    #[error("Unknown model handle {handle}")]
    UnknownModel { handle: usize },

    /// An externally-originated event reached the model layer, which accepts
    /// none.
    #[error("External event '{name}' not allowed on model '{model}'")]
    ExternalEventRejected { name: &'static str, model: String },

    /// A link exception went unhandled; its default action aborts
    /// processing.
    #[error("Fatal link failure for '{url}': {reason}")]
    LinkFailure { url: String, reason: String },

    /// An attempt to mutate a read-only instance.
    #[error("Instance '{id}' is read-only")]
    InstanceReadOnly { id: String },

    /// A node reference did not belong to any instance of the model.
    #[error("Node does not belong to any instance of model '{model}'")]
    ForeignNode { model: String },

    /// Malformed effective-id input.
    #[error(transparent)]
    MalformedId(#[from] MalformedId),

    /// Data tree operation failure.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Instance XML failure.
    #[error(transparent)]
    Xml(#[from] XmlError),

    /// Instance content load failure escalated to the caller.
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl TrellisError {
    /// Create a fatal link failure.
    pub fn link_failure(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LinkFailure {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a non-static-target error.
    pub fn target_not_static(id: impl Into<String>) -> Self {
        Self::TargetIdNotStatic { id: id.into() }
    }

    /// Create an unknown-instance error.
    pub fn unknown_instance(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self::UnknownInstanceId {
            id: id.into(),
            model: model.into(),
        }
    }
}
