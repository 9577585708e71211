//! Run-scoped state types.
//!
//! # Run Lifecycle
//!
//! ```text
//!           run()
//! Created ─────────→ Running ──(all phases, clear, report)──→ Completed
//!                       │
//!                       ├──(transport error in a phase)─────→ Failed
//!                       │
//!                       └──(cancellation token fired)───────→ Cancelled
//! ```
//!
//! A [`SyncOrchestrator`](super::SyncOrchestrator) runs exactly once; every
//! terminal state is final.

use crate::model::{
    string_field, ExceptionResult, Record, RunVersion, FIELD_CLASSIFICATION_ID, FIELD_OBJ_ID,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Phase
// ═══════════════════════════════════════════════════════════════════════════════

/// A step of a run that can produce exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Instance,
    Model,
    Association,
    ClearData,
}

impl Phase {
    /// Run order.
    pub const ALL: [Phase; 4] = [
        Phase::Instance,
        Phase::Model,
        Phase::Association,
        Phase::ClearData,
    ];

    /// Bucket name used in the exception log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Instance => "instance",
            Phase::Model => "model",
            Phase::Association => "association",
            Phase::ClearData => "clear_data",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ExceptionReport
// ═══════════════════════════════════════════════════════════════════════════════

/// Record-level exceptions of one run, bucketed by phase in run order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExceptionReport {
    buckets: Vec<(Phase, Vec<ExceptionResult>)>,
}

impl ExceptionReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entries` to `phase`'s bucket, opening it if needed.
    pub fn record(&mut self, phase: Phase, entries: Vec<ExceptionResult>) {
        crate::metrics::record_exceptions(phase.as_str(), entries.len());
        match self.buckets.iter_mut().find(|(p, _)| *p == phase) {
            Some((_, bucket)) => bucket.extend(entries),
            None => self.buckets.push((phase, entries)),
        }
    }

    pub fn buckets(&self) -> &[(Phase, Vec<ExceptionResult>)] {
        &self.buckets
    }

    pub fn bucket(&self, phase: Phase) -> Option<&[ExceptionResult]> {
        self.buckets
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, entries)| entries.as_slice())
    }

    /// Entries across all buckets.
    pub fn total(&self) -> usize {
        self.buckets.iter().map(|(_, entries)| entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DiscoveredState
// ═══════════════════════════════════════════════════════════════════════════════

/// What earlier phases learned that later phases filter on.
///
/// Owned by one run and dropped with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredState {
    /// Keys read back from this run's business pushes.
    pub business_ids: BTreeSet<i64>,
    /// Object types whose instances are synced.
    pub object_ids: BTreeSet<String>,
    /// Classifications referenced by synced models.
    pub classification_ids: BTreeSet<String>,
}

impl DiscoveredState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_business_ids(&mut self, ids: impl IntoIterator<Item = i64>) {
        self.business_ids.extend(ids);
    }

    /// Pick up `bk_obj_id` and `bk_classification_id` from a model row.
    pub fn record_model_row(&mut self, row: &Record) {
        if let Some(obj_id) = string_field(row, FIELD_OBJ_ID) {
            self.object_ids.insert(obj_id.to_string());
        }
        if let Some(classification) = string_field(row, FIELD_CLASSIFICATION_ID) {
            self.classification_ids.insert(classification.to_string());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RunState / RunSummary
// ═══════════════════════════════════════════════════════════════════════════════

/// State of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Orchestrator built, nothing executed.
    Created,
    /// Phases are executing.
    Running,
    /// Every phase ran, stale data cleared, report flushed.
    Completed,
    /// A phase hit a transport error.
    Failed,
    /// The cancellation token fired mid-run.
    Cancelled,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Created => write!(f, "Created"),
            RunState::Running => write!(f, "Running"),
            RunState::Completed => write!(f, "Completed"),
            RunState::Failed => write!(f, "Failed"),
            RunState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Remote-call counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub fetch_calls: usize,
    pub push_calls: usize,
    pub records_pushed: usize,
}

/// What a completed run reports back.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub task: String,
    pub synchronize_flag: String,
    pub version: RunVersion,
    pub state: RunState,
    pub stats: RunStats,
    pub discovered: DiscoveredState,
    /// Exceptions per phase, in run order.
    pub exception_counts: Vec<(Phase, usize)>,
    /// Where the exception log was written, if it could be.
    pub exception_log: Option<PathBuf>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn total_exceptions(&self) -> usize {
        self.exception_counts.iter().map(|(_, n)| n).sum()
    }
}
