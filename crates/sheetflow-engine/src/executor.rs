//! Single-pipeline DAG execution.
//!
//! Ready blocks run concurrently. A block is ready once its one inbound
//! edge has delivered; sources are ready immediately. A failed block marks
//! every transitive successor as upstream-failed, while independent
//! branches keep running.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sheetflow_store::TableStore;
use sheetflow_types::error::BlockError;
use sheetflow_types::io::IoValue;
use tokio::task::JoinSet;

use crate::blocks::{BlockContext, BlockOutput};
use crate::fetch::Fetcher;
use crate::graph::PipelineGraph;
use crate::result::{BlockReport, BlockStats, BlockStatus, FailureSummary, PipelineReport};

struct Finished {
    index: usize,
    outcome: Result<BlockOutput, BlockError>,
    elapsed: Duration,
}

fn spawn_block(
    join_set: &mut JoinSet<Finished>,
    graph: &PipelineGraph,
    index: usize,
    input: Arc<IoValue>,
    fetcher: &Arc<dyn Fetcher>,
    store: &Arc<dyn TableStore>,
) {
    let node = graph.node(index);
    let block = Arc::clone(&node.block);
    let ctx = BlockContext {
        pipeline: graph.id().clone(),
        block: node.name.clone(),
        fetcher: Arc::clone(fetcher),
        store: Arc::clone(store),
    };
    tracing::debug!(pipeline = %ctx.pipeline, block = %ctx.block, kind = node.kind, "Block started");
    join_set.spawn(async move {
        let started = Instant::now();
        // Inner task so a panicking block surfaces as that block's failure.
        let handle = tokio::spawn(async move { block.execute(input, &ctx).await });
        let outcome = match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(BlockError::internal(
                "BLOCK_PANICKED",
                format!("block task failed: {join_err}"),
            )),
        };
        Finished {
            index,
            outcome,
            elapsed: started.elapsed(),
        }
    });
}

fn report(
    graph: &PipelineGraph,
    index: usize,
    status: BlockStatus,
    elapsed: Duration,
    stats: BlockStats,
    error: Option<BlockError>,
) -> BlockReport {
    let node = graph.node(index);
    BlockReport {
        block: node.name.to_string(),
        kind: node.kind.to_string(),
        status,
        duration_secs: elapsed.as_secs_f64(),
        stats,
        error,
    }
}

/// Run every block of `graph` once and report the outcome.
///
/// Block failures are recorded in the report, never returned.
pub async fn execute_pipeline(
    graph: &PipelineGraph,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn TableStore>,
) -> PipelineReport {
    let started = Instant::now();
    let pipeline = graph.id().to_string();
    tracing::info!(pipeline = %pipeline, blocks = graph.len(), "Pipeline started");

    let mut reports: Vec<Option<BlockReport>> = (0..graph.len()).map(|_| None).collect();
    let mut failure: Option<FailureSummary> = None;
    let mut join_set = JoinSet::new();

    let none = Arc::new(IoValue::None);
    for index in graph.sources() {
        spawn_block(&mut join_set, graph, index, Arc::clone(&none), &fetcher, &store);
    }

    while let Some(joined) = join_set.join_next().await {
        let Finished {
            index,
            outcome,
            elapsed,
        } = match joined {
            Ok(finished) => finished,
            Err(join_err) => {
                tracing::error!(pipeline = %pipeline, "Block supervisor task failed: {join_err}");
                continue;
            }
        };
        let name = graph.node(index).name.clone();

        match outcome {
            Ok(output) => {
                tracing::debug!(
                    pipeline = %pipeline,
                    block = %name,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Block succeeded"
                );
                let value = Arc::new(output.value);
                for &next in graph.successors(index) {
                    spawn_block(&mut join_set, graph, next, Arc::clone(&value), &fetcher, &store);
                }
                reports[index] = Some(report(
                    graph,
                    index,
                    BlockStatus::Succeeded,
                    elapsed,
                    output.stats,
                    None,
                ));
            }
            Err(error) => {
                tracing::error!(
                    pipeline = %pipeline,
                    block = %name,
                    kind = %error.kind,
                    code = %error.code,
                    "Block failed: {}",
                    error.message
                );
                if failure.is_none() {
                    failure = Some(FailureSummary {
                        block: name.to_string(),
                        kind: error.kind,
                        code: error.code.clone(),
                        message: error.message.clone(),
                    });
                }
                for downstream in graph.descendants(index) {
                    reports[downstream] = Some(report(
                        graph,
                        downstream,
                        BlockStatus::UpstreamFailed,
                        Duration::ZERO,
                        BlockStats::default(),
                        None,
                    ));
                }
                reports[index] = Some(report(
                    graph,
                    index,
                    BlockStatus::Failed,
                    elapsed,
                    BlockStats::default(),
                    Some(error),
                ));
            }
        }
    }

    // Only reachable when a supervisor task itself died.
    for (index, slot) in reports.iter_mut().enumerate() {
        if slot.is_none() {
            let error = BlockError::internal("BLOCK_LOST", "block never reported an outcome");
            if failure.is_none() {
                failure = Some(FailureSummary {
                    block: graph.node(index).name.to_string(),
                    kind: error.kind,
                    code: error.code.clone(),
                    message: error.message.clone(),
                });
            }
            *slot = Some(report(
                graph,
                index,
                BlockStatus::Failed,
                Duration::ZERO,
                BlockStats::default(),
                Some(error),
            ));
        }
    }

    let blocks: Vec<BlockReport> = graph
        .topological_order()
        .iter()
        .filter_map(|&i| reports[i].take())
        .collect();
    let succeeded = failure.is_none();
    let duration_secs = started.elapsed().as_secs_f64();

    let result = PipelineReport {
        pipeline,
        succeeded,
        duration_secs,
        blocks,
        failure,
    };
    if succeeded {
        tracing::info!(
            pipeline = %result.pipeline,
            rows_loaded = result.loaded_tables().map(|t| t.rows).sum::<u64>(),
            rows_dropped = result.rows_dropped(),
            duration_secs,
            "Pipeline succeeded"
        );
    } else {
        tracing::error!(pipeline = %result.pipeline, duration_secs, "Pipeline failed");
    }
    result
}
