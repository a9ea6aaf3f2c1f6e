//! Error types for Palisade operations.
//!
//! This module defines [`PalisadeError`], the primary error type used
//! throughout the application, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Errors are classified at the step boundary; the orchestrator only ever
//!   observes a per-step outcome plus the classified reason
//! - Use `PalisadeError` for domain-specific errors that need distinct handling
//! - Use `anyhow::Error` (via `PalisadeError::Other`) for unexpected errors

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for Palisade operations.
#[derive(Debug, Error)]
pub enum PalisadeError {
    /// A required external tool or package is missing and could not be installed.
    #[error("Dependency unavailable for step '{step}': {message}")]
    DependencyUnavailable { step: String, message: String },

    /// An artifact failed a validation gate.
    #[error("Validation failed: {reason}")]
    ValidationFailed { reason: String },

    /// A collaborator command exited non-zero or could not be spawned.
    #[error("Command failed with exit code {code:?}: {command}")]
    CommandFailed { command: String, code: Option<i32> },

    /// A mandatory configuration key could not be resolved from any source.
    #[error("Missing required configuration key: {key}")]
    MissingRequiredConfig { key: String },

    /// Step execution failed.
    #[error("Step '{step}' failed: {message}")]
    StepExecutionError { step: String, message: String },

    /// Failed to parse a configuration or template document.
    #[error("Failed to parse {path}: {message}")]
    ConfigParseError { path: PathBuf, message: String },

    /// A pipeline references a step name the registry does not know.
    ///
    /// Unknown names abort the whole run; silently omitting a step would
    /// change provisioning semantics without the operator's knowledge.
    #[error("Unknown step: {name}")]
    UnknownStep { name: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Palisade operations.
pub type Result<T> = std::result::Result<T, PalisadeError>;
