use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;

use sheetflow_engine::fetch::ReqwestFetcher;
use sheetflow_engine::{run_project, ExecutionOptions, PipelineReport, Project, RunReport};
use sheetflow_store::SqliteTableStore;

/// Execute the `run` command: load, validate, and run a project's pipelines.
pub async fn execute(project_path: &Path, pipelines: Vec<String>) -> Result<ExitCode> {
    let project = Project::load(project_path)?;

    tracing::info!(
        project = %project_path.display(),
        pipelines = project.graphs().len(),
        value_types = project.registry().type_count(),
        "Project validated"
    );

    let options = ExecutionOptions { pipelines };
    let fetcher = Arc::new(ReqwestFetcher::new()?);
    let store = Arc::new(SqliteTableStore::new());
    let report = run_project(&project, &options, fetcher, store).await?;

    print!("{}", render_summary(&report));

    // Machine-readable JSON for scripts and CI
    println!("@@RUN_JSON@@{}", serde_json::to_string(&report)?);

    if report.succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn render_pipeline(out: &mut String, pipeline: &PipelineReport) {
    match &pipeline.failure {
        None => {
            let _ = writeln!(out, "Pipeline '{}' completed successfully.", pipeline.pipeline);
            for table in pipeline.loaded_tables() {
                let _ = writeln!(
                    out,
                    "  Table {:14} {} rows -> {}",
                    table.table,
                    table.rows,
                    table.file.display()
                );
            }
        }
        Some(failure) => {
            let _ = writeln!(
                out,
                "Pipeline '{}' FAILED at block '{}' ({}): {}: {}",
                pipeline.pipeline, failure.block, failure.kind, failure.code, failure.message
            );
        }
    }
    let _ = writeln!(out, "  Rows dropped:    {}", pipeline.rows_dropped());
    for block in pipeline.blocks.iter().filter(|b| b.stats.rows_dropped > 0) {
        for (column, reasons) in &block.stats.rejections {
            for (reason, count) in reasons {
                let _ = writeln!(out, "    {}.{column}: {count} {reason}", block.block);
            }
        }
    }
    let _ = writeln!(out, "  Duration:        {:.2}s", pipeline.duration_secs);
}

fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    for pipeline in &report.pipelines {
        render_pipeline(&mut out, pipeline);
    }
    let failed = report.failed().count();
    let _ = writeln!(
        out,
        "{} pipeline(s) succeeded, {failed} failed in {:.2}s.",
        report.pipelines.len() - failed,
        report.duration_secs
    );
    out
}
