//! Semantic validation for parsed project configuration values.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::blocks::BuildContext;
use crate::config::types::{Parallelism, ProjectConfig};
use crate::graph::PipelineGraph;
use crate::valuetype::ValueTypeRegistry;

/// Validate a parsed project configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// Assembles the value-type registry and every pipeline graph, so a
/// project that passes here will also load.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the project.
pub fn validate_project(config: &ProjectConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported project version '{}', expected '1.0'",
            config.version
        ));
    }

    if matches!(config.resources.parallelism, Parallelism::Manual(0)) {
        errors.push("parallelism must be at least 1".to_string());
    }

    if config.resources.extract_timeout_seconds == 0 {
        errors.push("extract_timeout_seconds must be > 0".to_string());
    }

    if config.pipelines.is_empty() {
        errors.push("Project must define at least one pipeline".to_string());
    }

    let mut names = HashSet::new();
    for (i, pipeline) in config.pipelines.iter().enumerate() {
        if pipeline.name.trim().is_empty() {
            errors.push(format!("Pipeline {i} has an empty name"));
        } else if !names.insert(pipeline.name.as_str()) {
            errors.push(format!("Duplicate pipeline name '{}'", pipeline.name));
        }
    }

    let registry = match ValueTypeRegistry::build(&config.constraints, &config.valuetypes) {
        Ok(registry) => registry,
        Err(registry_errors) => {
            errors.extend(registry_errors);
            // Keep checking graphs against the primitives so block errors
            // are still reported.
            ValueTypeRegistry::default()
        }
    };

    let ctx = BuildContext {
        registry: &registry,
        base_dir: &config.base_dir,
        extract_timeout: Duration::from_secs(config.resources.extract_timeout_seconds.max(1)),
    };
    for pipeline in &config.pipelines {
        if let Err(graph_errors) = PipelineGraph::build(pipeline, &ctx) {
            errors.extend(graph_errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Project validation failed:\n  - {}", errors.join("\n  - "));
    }
}
