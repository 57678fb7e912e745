//! Harvest module - namespace-scoped manifest harvesting pipeline.
//!
//! This module provides the building blocks of one harvest:
//! - **Traits**: [`HarvestStage`] for the per-object stages
//! - **Filter**: the shared [`ExclusionPolicy`]
//! - **Stages**: [`ManifestSanitizer`] and [`ManifestWriter`]
//! - **Pipeline**: orchestrator via [`pipeline::HarvestPipeline`]

pub mod filter;
pub mod pipeline;
pub mod sanitize;
pub mod traits;
pub mod writer;

// Re-export commonly used types
pub use filter::{is_excluded, ExclusionPolicy, DEFAULT_EXCLUSIONS};
pub use sanitize::ManifestSanitizer;
pub use traits::{HarvestStage, ParseError, WriteError};
pub use writer::ManifestWriter;

pub use pipeline::{
    HarvestPipeline, HarvestResult, HarvestState, HarvestStats, PipelineError,
    DEFAULT_CONCURRENCY, DEFAULT_UNIT_TIMEOUT,
};
