//! Engine-level error model.

/// Failure of a run as a whole, as opposed to a block failure.
///
/// Block failures never surface here: they are recorded in the
/// [`PipelineReport`](crate::result::PipelineReport) of the pipeline they
/// occurred in, so sibling pipelines keep running.
#[derive(Debug)]
pub enum PipelineError {
    /// A pipeline filter named a pipeline the project does not declare.
    UnknownPipeline(String),
    /// Infrastructure error (task join failures, semaphore closure, etc.)
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPipeline(name) => write!(f, "unknown pipeline '{name}'"),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}
