//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - Mock SourceRef serving canned rows with paging and filters
//! - Mock TargetRef recording pushes and clears over a replace store
//! - Helpers to build orchestrators against the mocks

#![allow(dead_code)]

pub mod mock_remote;

pub use mock_remote::*;

use cmdb_replicator::{EngineSettings, RunVersion, SyncOrchestrator, SyncTaskConfig};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Settings pointing the exception log at `dir`, with `page_size`.
pub fn settings(dir: &Path, page_size: u64) -> EngineSettings {
    let mut settings = EngineSettings::for_testing(dir.to_string_lossy());
    settings.page_size = page_size;
    settings
}

/// An orchestrator over the mocks with a fresh cancellation token.
pub fn orchestrator(
    task: SyncTaskConfig,
    version: i64,
    settings: &EngineSettings,
    source: &Arc<MockSource>,
    target: &Arc<MockTarget>,
) -> SyncOrchestrator {
    orchestrator_with_cancel(task, version, settings, source, target, CancellationToken::new())
}

pub fn orchestrator_with_cancel(
    task: SyncTaskConfig,
    version: i64,
    settings: &EngineSettings,
    source: &Arc<MockSource>,
    target: &Arc<MockTarget>,
    cancel: CancellationToken,
) -> SyncOrchestrator {
    SyncOrchestrator::new(
        task,
        RunVersion(version),
        settings,
        source.clone(),
        target.clone(),
        cancel,
    )
}
