//! Runtime execution options for project runs.

/// Runtime execution options (not part of the project YAML).
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Run only these pipelines. Empty runs every pipeline.
    pub pipelines: Vec<String>,
}

impl ExecutionOptions {
    /// Whether `pipeline` is selected by these options.
    #[must_use]
    pub fn selects(&self, pipeline: &str) -> bool {
        self.pipelines.is_empty() || self.pipelines.iter().any(|p| p == pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_options_default_selects_everything() {
        let opts = ExecutionOptions::default();
        assert!(opts.selects("Stops"));
        assert!(opts.selects("Routes"));
    }

    #[test]
    fn filter_selects_named_pipelines_only() {
        let opts = ExecutionOptions {
            pipelines: vec!["Stops".into()],
        };
        assert!(opts.selects("Stops"));
        assert!(!opts.selects("Routes"));
    }
}
