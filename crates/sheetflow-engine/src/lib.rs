//! Configuration loading, block implementations and execution for
//! sheetflow pipelines.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod blocks;
pub mod config;
pub mod errors;
pub mod execution;
pub mod executor;
pub mod fetch;
pub mod graph;
pub mod orchestrator;
pub mod project;
pub mod result;
pub mod valuetype;

// Re-export public API for convenience
pub use errors::PipelineError;
pub use execution::ExecutionOptions;
pub use orchestrator::run_project;
pub use project::Project;
pub use result::{PipelineReport, RunReport};
