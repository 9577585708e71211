// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync orchestrator: runs one task end-to-end.
//!
//! # Phases
//!
//! ```text
//! Pretreatment ──▶ Instance ──▶ Model ──▶ Association ──▶ ClearStaleData ──▶ ReportExceptions
//!   (built-in       (biz first,   (base, attr,  (module_host_config   (one signed      (exception log
//!    objects)        business     group, then    scoped by business    call, best       + background
//!                    IDs found)   classif.)      IDs)                  effort)          retention)
//! ```
//!
//! Phases run strictly in order because each filters on what an earlier one
//! discovered. Within a phase pages are fetched and pushed one at a time.
//!
//! # Failure policy
//!
//! - Transport failure or cancellation during a fetch or push aborts the run.
//!   Clearance and reporting don't happen; pages already pushed stay on the
//!   target until a later run replaces or clears them.
//! - Key conversion failures and target rejections are collected into the
//!   [`ExceptionReport`] and never stop anything.
//! - Clearance failures become one `clear_data` entry.
//! - Exception log failures are logged only.

mod association;
mod instance;
mod model;
mod types;

pub use types::{
    DiscoveredState, ExceptionReport, Phase, RunState, RunStats, RunSummary,
};

use crate::config::{EngineSettings, SyncTaskConfig};
use crate::error::{ReplicationError, Result};
use crate::exception::{ExceptionSink, RetentionTask};
use crate::fetch::{AssociationFetcher, InstanceFetcher, ModelFetcher, Page};
use crate::metrics;
use crate::model::{
    unix_now, DataType, ExceptionResult, RunVersion, BUILTIN_OBJECTS,
    CODE_CLEAR_TRANSPORT_FAILED, CODE_PUSH_REJECTED,
};
use crate::pusher::{PreparedPage, PushOutcome, RecordPusher};
use crate::remote::{CallContext, ClearStaleDataRequest, SourceRef, TargetRef};
use crate::resilience::RateLimiter;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Drives one run of one [`SyncTaskConfig`] under one [`RunVersion`].
///
/// Owns the run's [`DiscoveredState`] and [`ExceptionReport`]; neither is
/// shared with any other run.
pub struct SyncOrchestrator {
    task: SyncTaskConfig,
    version: RunVersion,
    page_size: u64,
    exception_dir: PathBuf,

    ctx: CallContext,
    target: Arc<dyn TargetRef>,
    pusher: RecordPusher,
    instances: InstanceFetcher,
    models: ModelFetcher,
    associations: AssociationFetcher,

    state: RunState,
    pretreated: bool,
    discovered: DiscoveredState,
    report: ExceptionReport,
    stats: RunStats,
    retention: Option<RetentionTask>,
}

impl SyncOrchestrator {
    /// Build an orchestrator for one run.
    ///
    /// `cancel` aborts the run when fired; every remote call watches it.
    pub fn new(
        task: SyncTaskConfig,
        version: RunVersion,
        settings: &EngineSettings,
        source: Arc<dyn SourceRef>,
        target: Arc<dyn TargetRef>,
        cancel: CancellationToken,
    ) -> Self {
        let pusher = RecordPusher::new(Arc::clone(&target), version, &task.synchronize_flag);
        Self {
            instances: InstanceFetcher::new(Arc::clone(&source), &task),
            models: ModelFetcher::new(Arc::clone(&source), &task),
            associations: AssociationFetcher::new(source, &task),
            pusher,
            target,
            ctx: CallContext::new(cancel),
            page_size: settings.page_size.max(1),
            exception_dir: PathBuf::from(&settings.exception_dir),
            task,
            version,
            state: RunState::Created,
            pretreated: false,
            discovered: DiscoveredState::new(),
            report: ExceptionReport::new(),
            stats: RunStats::default(),
            retention: None,
        }
    }

    /// Throttle every remote call through a shared limiter.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.ctx = self.ctx.with_rate_limiter(limiter);
        self
    }

    pub fn task(&self) -> &SyncTaskConfig {
        &self.task
    }

    pub fn version(&self) -> RunVersion {
        self.version
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn discovered(&self) -> &DiscoveredState {
        &self.discovered
    }

    pub fn report(&self) -> &ExceptionReport {
        &self.report
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Phases
    // ═══════════════════════════════════════════════════════════════════════════

    /// Expand the whitelist with the built-in objects and seed the object set.
    ///
    /// The seeded set is what the instance phase walks. A whitelist seeds its
    /// own (expanded) entries. A blacklist seeds only the built-ins it doesn't
    /// name, so custom object instances are replicated only when whitelisted:
    /// custom objects surface in the model phase, after instances are done,
    /// and are kept for reporting only.
    ///
    /// Idempotent; cannot fail.
    pub fn pretreatment(&mut self) {
        if self.pretreated {
            return;
        }
        self.pretreated = true;

        if self.task.expand_builtin_objects() {
            debug!(object_ids = ?self.task.object_ids, "Whitelist expanded with built-in objects");
        }

        if self.task.whitelist && !self.task.object_ids.is_empty() {
            self.discovered
                .object_ids
                .extend(self.task.object_ids.iter().cloned());
        } else {
            self.discovered.object_ids.extend(
                BUILTIN_OBJECTS
                    .iter()
                    .filter(|obj| self.task.includes_object(obj))
                    .map(|obj| obj.to_string()),
            );
        }
    }

    /// Ask the target to drop rows of this flag older than this version.
    ///
    /// A transport failure or a rejection becomes one `clear_data` entry;
    /// only cancellation is returned as an error.
    pub async fn clear_stale_data(&mut self) -> Result<()> {
        let request =
            ClearStaleDataRequest::signed(self.version, &self.task.synchronize_flag, unix_now());

        let entry = match self
            .ctx
            .call("clear_stale_data", self.target.clear_stale_data(request))
            .await
        {
            Ok(response) if response.accepted => {
                metrics::record_clear_stale_data(&self.task.synchronize_flag, "accepted");
                info!(version = %self.version, "Stale data cleared");
                None
            }
            Ok(response) => {
                metrics::record_clear_stale_data(&self.task.synchronize_flag, "rejected");
                warn!(code = response.code, message = %response.message, "Target refused to clear stale data");
                let code = if response.code == 0 { CODE_PUSH_REJECTED } else { response.code };
                Some(ExceptionResult::new(code, response.message, Value::Null, 0))
            }
            Err(e @ ReplicationError::Cancelled { .. }) => return Err(e),
            Err(e) => {
                metrics::record_clear_stale_data(&self.task.synchronize_flag, "transport_error");
                warn!(error = %e, "Clear stale data call failed");
                Some(ExceptionResult::new(
                    CODE_CLEAR_TRANSPORT_FAILED,
                    e.to_string(),
                    Value::Null,
                    0,
                ))
            }
        };

        if let Some(entry) = entry {
            self.report.record(Phase::ClearData, vec![entry]);
        }
        Ok(())
    }

    /// Write the report to this run's exception log and start retention.
    ///
    /// Returns the log path, or `None` if the log couldn't be created.
    pub async fn report_exceptions(&mut self) -> Option<PathBuf> {
        let sink = ExceptionSink::new(
            &self.exception_dir,
            &self.task.synchronize_flag,
            self.version,
            self.task.exception_retain_count,
        );

        match sink.write_report(&self.report).await {
            Ok(stats) => {
                if stats.entries_skipped > 0 {
                    warn!(skipped = stats.entries_skipped, "Some exception entries were not recorded");
                }
                self.retention = Some(sink.spawn_retention());
                Some(sink.path())
            }
            Err(e) => {
                warn!(error = %e, lost = self.report.total(), "Exception log unavailable, exceptions not recorded");
                metrics::record_exception_sink_failure("create");
                None
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Run
    // ═══════════════════════════════════════════════════════════════════════════

    /// Execute every phase in order.
    ///
    /// May be called once. Retention keeps running in the background
    /// afterwards; call [`finish`](Self::finish) to join it.
    pub async fn run(&mut self) -> Result<RunSummary> {
        if self.state != RunState::Created {
            return Err(ReplicationError::InvalidState {
                expected: RunState::Created.to_string(),
                actual: self.state.to_string(),
            });
        }

        let span = info_span!(
            "sync_run",
            task = %self.task.name,
            flag = %self.task.synchronize_flag,
            version = %self.version
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        self.state = RunState::Running;
        info!("Starting sync run");

        self.pretreatment();

        if let Err(e) = self.run_phases().await {
            self.state = if matches!(e, ReplicationError::Cancelled { .. }) {
                RunState::Cancelled
            } else {
                RunState::Failed
            };
            error!(error = %e, state = %self.state, "Sync run aborted");
            metrics::record_run_outcome(
                &self.task.name,
                &self.state.to_string().to_lowercase(),
                started.elapsed(),
            );
            return Err(e);
        }

        let exception_log = self.report_exceptions().await;
        self.state = RunState::Completed;

        let duration = started.elapsed();
        metrics::record_run_outcome(&self.task.name, "completed", duration);
        metrics::set_discovered_businesses(&self.task.name, self.discovered.business_ids.len());
        info!(
            fetch_calls = self.stats.fetch_calls,
            push_calls = self.stats.push_calls,
            records = self.stats.records_pushed,
            exceptions = self.report.total(),
            duration_ms = duration.as_millis() as u64,
            "Sync run completed"
        );

        Ok(RunSummary {
            task: self.task.name.clone(),
            synchronize_flag: self.task.synchronize_flag.clone(),
            version: self.version,
            state: self.state,
            stats: self.stats,
            discovered: self.discovered.clone(),
            exception_counts: self
                .report
                .buckets()
                .iter()
                .map(|(phase, entries)| (*phase, entries.len()))
                .collect(),
            exception_log,
            duration,
        })
    }

    async fn run_phases(&mut self) -> Result<()> {
        let timer = Instant::now();
        self.run_instance_phase().await?;
        metrics::record_phase_duration(&self.task.name, Phase::Instance.as_str(), timer.elapsed());

        let timer = Instant::now();
        self.run_model_phase().await?;
        metrics::record_phase_duration(&self.task.name, Phase::Model.as_str(), timer.elapsed());

        let timer = Instant::now();
        self.run_association_phase().await?;
        metrics::record_phase_duration(&self.task.name, Phase::Association.as_str(), timer.elapsed());

        if self.ctx.is_cancelled() {
            return Err(ReplicationError::cancelled("clear_stale_data"));
        }
        self.clear_stale_data().await
    }

    /// Join background retention, waiting at most `timeout`.
    pub async fn finish(mut self, timeout: Duration) {
        if let Some(task) = self.retention.take() {
            if !task.join(timeout).await {
                debug!(flag = %self.task.synchronize_flag, "Retention did not finish cleanly");
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Shared page plumbing
    // ═══════════════════════════════════════════════════════════════════════════

    fn note_fetch(&mut self, page: &Page) {
        self.stats.fetch_calls += 1;
        if page.is_empty() && page.total > 0 {
            debug!(classify = %page.classify, start = page.start, total = page.total, "Source returned an empty page inside its count");
        }
    }

    /// Submit a prepared page and fold its outcome into the run.
    async fn submit(&mut self, prepared: PreparedPage) -> Result<PushOutcome> {
        let sent = !prepared.is_empty();
        let outcome = self.pusher.submit(&self.ctx, prepared).await?;
        if sent {
            self.stats.push_calls += 1;
            self.stats.records_pushed += outcome.pushed;
        }
        Ok(outcome)
    }

    /// Push one fetched page, collecting its exceptions under `phase`.
    ///
    /// Returns the keys extracted from the page.
    async fn push_page(&mut self, phase: Phase, data_type: DataType, page: Page) -> Result<Vec<i64>> {
        let prepared = self.pusher.prepare(data_type, page);
        let outcome = self.submit(prepared).await?;
        self.report.record(phase, outcome.exceptions);
        Ok(outcome.keys)
    }
}
