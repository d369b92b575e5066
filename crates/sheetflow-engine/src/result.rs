//! Pipeline execution reports.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sheetflow_types::error::{BlockError, ErrorKind};

/// Counters a block reports alongside its output value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_out: Option<u64>,
    #[serde(skip_serializing_if = "is_zero")]
    pub rows_dropped: u64,
    /// Rejected cells per column, then per reason.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub rejections: BTreeMap<String, BTreeMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded: Option<LoadedTable>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Rows persisted by a loader block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedTable {
    pub table: String,
    pub file: PathBuf,
    pub rows: u64,
}

/// Terminal state of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Succeeded,
    Failed,
    /// Never ran because a predecessor failed.
    UpstreamFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockReport {
    pub block: String,
    pub kind: String,
    pub status: BlockStatus,
    pub duration_secs: f64,
    #[serde(flatten)]
    pub stats: BlockStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BlockError>,
}

/// The block that failed a pipeline and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSummary {
    pub block: String,
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub pipeline: String,
    pub succeeded: bool,
    pub duration_secs: f64,
    pub blocks: Vec<BlockReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,
}

impl PipelineReport {
    /// Tables written by this pipeline's loaders.
    pub fn loaded_tables(&self) -> impl Iterator<Item = &LoadedTable> {
        self.blocks.iter().filter_map(|b| b.stats.loaded.as_ref())
    }

    /// Rows dropped by table interpretation across the pipeline.
    #[must_use]
    pub fn rows_dropped(&self) -> u64 {
        self.blocks.iter().map(|b| b.stats.rows_dropped).sum()
    }

    #[must_use]
    pub fn block(&self, name: &str) -> Option<&BlockReport> {
        self.blocks.iter().find(|b| b.block == name)
    }
}

/// Result of running a project's pipelines.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub parallelism: usize,
    pub pipelines: Vec<PipelineReport>,
}

impl RunReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.pipelines.iter().all(|p| p.succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PipelineReport> {
        self.pipelines.iter().filter(|p| !p.succeeded)
    }

    #[must_use]
    pub fn pipeline(&self, name: &str) -> Option<&PipelineReport> {
        self.pipelines.iter().find(|p| p.pipeline == name)
    }
}
