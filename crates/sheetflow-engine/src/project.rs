//! A loaded, validated project: registry plus one graph per pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::blocks::BuildContext;
use crate::config::parser::parse_project;
use crate::config::types::ProjectConfig;
use crate::config::validator::validate_project;
use crate::graph::PipelineGraph;
use crate::valuetype::ValueTypeRegistry;

/// Everything a run needs, built once and shared read-only.
#[derive(Debug)]
pub struct Project {
    config: ProjectConfig,
    registry: Arc<ValueTypeRegistry>,
    graphs: Vec<Arc<PipelineGraph>>,
}

impl Project {
    /// Parse, validate and assemble the project at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let config = parse_project(path)?;
        Self::from_config(config)
            .with_context(|| format!("Invalid project: {}", path.display()))
    }

    /// Validate and assemble an already parsed configuration.
    ///
    /// # Errors
    ///
    /// Returns every validation failure found.
    pub fn from_config(config: ProjectConfig) -> Result<Self> {
        validate_project(&config)?;

        let registry = ValueTypeRegistry::build(&config.constraints, &config.valuetypes)
            .map_err(|errors| anyhow::anyhow!(errors.join("; ")))?;
        let ctx = BuildContext {
            registry: &registry,
            base_dir: &config.base_dir,
            extract_timeout: Duration::from_secs(config.resources.extract_timeout_seconds),
        };
        let graphs = config
            .pipelines
            .iter()
            .map(|decl| {
                PipelineGraph::build(decl, &ctx)
                    .map(Arc::new)
                    .map_err(|errors| anyhow::anyhow!(errors.join("; ")))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            pipelines = graphs.len(),
            value_types = registry.type_count(),
            "Project loaded"
        );
        Ok(Self {
            config,
            registry: Arc::new(registry),
            graphs,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ValueTypeRegistry> {
        &self.registry
    }

    /// Pipeline graphs in declaration order.
    #[must_use]
    pub fn graphs(&self) -> &[Arc<PipelineGraph>] {
        &self.graphs
    }

    #[must_use]
    pub fn graph(&self, name: &str) -> Option<&Arc<PipelineGraph>> {
        self.graphs.iter().find(|g| g.id().as_str() == name)
    }
}
