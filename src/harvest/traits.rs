//! Core traits and error types for the harvest stages.
//!
//! This module defines the building blocks shared by the per-object stages:
//! - Stage abstraction via [`HarvestStage`]
//! - Sanitizer failures via [`ParseError`]
//! - Writer failures via [`WriteError`]

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Pipeline Trait
// ============================================================================

/// Generic per-object stage that transforms Input → Output.
///
/// Stages are synchronous; the pipeline runs them on the blocking thread pool
/// from inside a fetch unit.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` so that one instance can be
/// shared by every concurrently running unit.
///
/// # Examples
///
/// ```ignore
/// struct UppercaseNames;
///
/// impl HarvestStage for UppercaseNames {
///     type Input = SanitizedManifest;
///     type Output = SanitizedManifest;
///     type Error = ParseError;
///
///     fn execute(&self, mut input: Self::Input) -> Result<Self::Output, Self::Error> {
///         input.metadata.name = input.metadata.name.to_uppercase();
///         Ok(input)
///     }
///
///     fn stage_name(&self) -> &'static str {
///         "uppercase"
///     }
/// }
/// ```
pub trait HarvestStage: Send + Sync {
    /// Input type consumed by this stage
    type Input;

    /// Output type produced by this stage
    type Output;

    /// Error type for stage failures
    type Error: std::error::Error + Send + Sync + 'static;

    /// Executes the stage.
    ///
    /// # Idempotence
    ///
    /// Running a stage on its own output must not change the result.
    ///
    /// # Errors
    ///
    /// Returns `Err` if processing fails. Every stage error is fatal for the
    /// harvest it belongs to.
    fn execute(&self, input: Self::Input) -> Result<Self::Output, Self::Error>;

    /// Returns a human-readable name for this stage.
    ///
    /// Used for logging.
    fn stage_name(&self) -> &'static str;
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while projecting a fetched manifest.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Document is not YAML or not a mapping
    #[error("Manifest of '{object}' is not a valid document: {message}")]
    InvalidDocument { object: String, message: String },

    /// A field required for re-applying the object is absent or empty
    #[error("Manifest of '{object}' is missing required field '{field}'")]
    MissingField { object: String, field: &'static str },

    /// `kind` is not one the harvester knows how to project
    #[error("Manifest of '{object}' has unsupported kind '{kind}'")]
    UnsupportedKind { object: String, kind: String },

    /// `kind` differs from the kind being harvested
    #[error("Manifest of '{object}' has kind '{found}', expected '{expected}'")]
    KindMismatch {
        object: String,
        expected: String,
        found: String,
    },
}

/// Errors raised while persisting a sanitized manifest.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Creating the output directory or writing the file failed
    #[error("Failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest could not be serialized
    #[error("Failed to serialize manifest '{name}': {message}")]
    Serialize { name: String, message: String },

    /// Object name would produce a path outside the output directory
    #[error("Object name '{0}' cannot be used as a file name")]
    InvalidName(String),

    /// Manifest kind has no file suffix
    #[error("Unknown manifest kind '{0}'")]
    UnknownKind(String),
}

// ============================================================================
// Tests
// ============================================================================
