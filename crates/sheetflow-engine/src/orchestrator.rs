//! Project runs: every selected pipeline, concurrently, within the
//! configured parallelism.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sheetflow_store::TableStore;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::types::Parallelism;
use crate::errors::PipelineError;
use crate::execution::ExecutionOptions;
use crate::executor::execute_pipeline;
use crate::fetch::Fetcher;
use crate::graph::PipelineGraph;
use crate::project::Project;
use crate::result::{PipelineReport, RunReport};

/// Number of pipelines allowed to run at once.
#[must_use]
pub fn resolve_parallelism(parallelism: Parallelism) -> usize {
    match parallelism {
        Parallelism::Manual(value) => usize::try_from(value).unwrap_or(usize::MAX).max(1),
        Parallelism::Auto => std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1),
    }
}

fn select_graphs(
    project: &Project,
    options: &ExecutionOptions,
) -> Result<Vec<Arc<PipelineGraph>>, PipelineError> {
    if let Some(unknown) = options
        .pipelines
        .iter()
        .find(|name| project.graph(name).is_none())
    {
        return Err(PipelineError::UnknownPipeline(unknown.clone()));
    }
    Ok(project
        .graphs()
        .iter()
        .filter(|g| options.selects(g.id().as_str()))
        .cloned()
        .collect())
}

/// Run the selected pipelines of `project`.
///
/// A failing pipeline is recorded in the run report and never stops the
/// others.
///
/// # Errors
///
/// Returns a `PipelineError` if the options name an unknown pipeline or a
/// pipeline task cannot be joined.
pub async fn run_project(
    project: &Project,
    options: &ExecutionOptions,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn TableStore>,
) -> Result<RunReport, PipelineError> {
    let graphs = select_graphs(project, options)?;
    let parallelism = resolve_parallelism(project.config().resources.parallelism);
    let started_at = Utc::now();
    let started = Instant::now();
    tracing::info!(
        pipelines = graphs.len(),
        parallelism,
        "Run started"
    );

    let semaphore = Arc::new(Semaphore::new(parallelism));
    let mut join_set: JoinSet<Result<(usize, PipelineReport), PipelineError>> = JoinSet::new();
    for (position, graph) in graphs.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let fetcher = Arc::clone(&fetcher);
        let store = Arc::clone(&store);
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| {
                PipelineError::Infrastructure(anyhow::anyhow!("Semaphore closed: {e}"))
            })?;
            let report = execute_pipeline(&graph, fetcher, store).await;
            Ok((position, report))
        });
    }

    let mut collected = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(entry)) => collected.push(entry),
            Ok(Err(error)) => {
                join_set.abort_all();
                return Err(error);
            }
            Err(join_err) => {
                join_set.abort_all();
                return Err(PipelineError::Infrastructure(anyhow::anyhow!(
                    "Pipeline task panicked: {join_err}"
                )));
            }
        }
    }
    collected.sort_by_key(|(position, _)| *position);

    let report = RunReport {
        started_at,
        duration_secs: started.elapsed().as_secs_f64(),
        parallelism,
        pipelines: collected.into_iter().map(|(_, report)| report).collect(),
    };
    tracing::info!(
        succeeded = report.pipelines.len() - report.failed().count(),
        failed = report.failed().count(),
        duration_secs = report.duration_secs,
        "Run finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::testing::NoFetch;
    use crate::config::parser::parse_project_str;
    use sheetflow_store::SqliteTableStore;

    #[test]
    fn manual_parallelism_override_is_honored() {
        assert_eq!(resolve_parallelism(Parallelism::Manual(3)), 3);
        assert_eq!(resolve_parallelism(Parallelism::Manual(0)), 1);
    }

    #[test]
    fn auto_parallelism_uses_available_cores() {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        assert_eq!(resolve_parallelism(Parallelism::Auto), cores);
    }

    fn project(dir: &std::path::Path) -> Project {
        std::fs::write(dir.join("a.csv"), "n\n1\n").unwrap();
        let yaml = r#"
version: "1.0"
resources:
  parallelism: 1
pipelines:
  - name: Broken
    blocks:
      - { name: Fetch, type: LocalFileExtractor, path: missing.csv }
  - name: Working
    blocks:
      - { name: Fetch, type: LocalFileExtractor, path: a.csv }
      - { name: Text, type: TextFileInterpreter }
    pipes:
      - Fetch -> Text
"#;
        let mut config = parse_project_str(yaml).unwrap();
        config.base_dir = dir.to_path_buf();
        Project::from_config(config).unwrap()
    }

    #[tokio::test]
    async fn failing_pipeline_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let report = run_project(
            &project,
            &ExecutionOptions::default(),
            Arc::new(NoFetch),
            Arc::new(SqliteTableStore::new()),
        )
        .await
        .unwrap();
        assert_eq!(report.parallelism, 1);
        assert_eq!(report.pipelines.len(), 2);
        assert_eq!(report.pipelines[0].pipeline, "Broken");
        assert!(!report.pipelines[0].succeeded);
        assert!(report.pipeline("Working").unwrap().succeeded);
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn filter_runs_selected_pipelines_only() {
        let dir = tempfile::tempdir().unwrap();
        let project = project(dir.path());
        let options = ExecutionOptions {
            pipelines: vec!["Working".into()],
        };
        let report = run_project(
            &project,
            &options,
            Arc::new(NoFetch),
            Arc::new(SqliteTableStore::new()),
        )
        .await
        .unwrap();
        assert_eq!(report.pipelines.len(), 1);
        assert!(report.succeeded());

        let options = ExecutionOptions {
            pipelines: vec!["Trips".into()],
        };
        let err = run_project(
            &project,
            &options,
            Arc::new(NoFetch),
            Arc::new(SqliteTableStore::new()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownPipeline(name) if name == "Trips"));
    }
}
