//! Error taxonomy for the formatting pipeline.
//!
//! Two layers:
//!
//! - [`EngineError`]: what a backend reports. `NotSupported` marks a feature
//!   the backend has no model for, as opposed to an operation that was
//!   attempted and failed.
//! - [`FormatError`]: what the pipeline reports. Step-scoped variants carry
//!   the step name plus the offending selector, action or recipe.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::Capability;

/// Errors raised by a backend engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{feature} is not supported by the {engine} engine")]
    NotSupported {
        engine: &'static str,
        feature: &'static str,
    },

    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("range does not belong to the open document")]
    ForeignRange,

    #[error("{0}")]
    Failed(String),

    #[error("automation bridge: {0}")]
    Bridge(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn not_supported(engine: &'static str, feature: &'static str) -> Self {
        Self::NotSupported { engine, feature }
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }
}

/// Errors raised by the pipeline while loading rules or applying steps.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no engine available: {0}")]
    EngineUnavailable(String),

    #[error("step '{step}': invalid selector: {detail}")]
    InvalidSelector { step: String, detail: String },

    #[error("step '{step}': unknown action '{action}'")]
    UnknownAction { step: String, action: String },

    #[error("step '{step}': action '{action}' changes document text but text changes are not allowed")]
    TextChangeDisallowed { step: String, action: String },

    #[error("step '{step}': unknown recipe '{name}' (available: {})", available.join(", "))]
    UnknownRecipe {
        step: String,
        name: String,
        available: Vec<String>,
    },

    #[error("step '{step}': recipe '{recipe}' requires {missing} which the {engine} engine does not provide")]
    CapabilityMismatch {
        step: String,
        recipe: String,
        engine: &'static str,
        missing: Capability,
    },

    #[error("step '{step}' failed in action '{action}': {source}")]
    StepFailure {
        step: String,
        action: String,
        #[source]
        source: EngineError,
    },

    #[error("open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("save {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("snapshot: {0}")]
    Snapshot(#[source] EngineError),

    /// Output directory or audit record could not be written.
    #[error("write {}: {message}", path.display())]
    Artifact { path: PathBuf, message: String },
}

impl FormatError {
    /// Name of the step this error is scoped to, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::InvalidSelector { step, .. }
            | Self::UnknownAction { step, .. }
            | Self::TextChangeDisallowed { step, .. }
            | Self::UnknownRecipe { step, .. }
            | Self::CapabilityMismatch { step, .. }
            | Self::StepFailure { step, .. } => Some(step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_recipe_lists_available_names() {
        let err = FormatError::UnknownRecipe {
            step: "Fix lists".to_string(),
            name: "does_not_exist".to_string(),
            available: vec!["a".to_string(), "b".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("does_not_exist"));
        assert!(message.contains("available: a, b"));
        assert_eq!(err.step(), Some("Fix lists"));
    }

    #[test]
    fn step_failure_keeps_not_supported_source() {
        let err = FormatError::StepFailure {
            step: "Fields".to_string(),
            action: "field_update".to_string(),
            source: EngineError::not_supported("docx", "field update"),
        };
        match err {
            FormatError::StepFailure { source, .. } => assert!(source.is_not_supported()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
