// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Long-running sync service.
//!
//! Runs every configured task once per interval. Tasks of one cycle run
//! concurrently and share the cycle's [`RunVersion`]; their synchronize flags
//! are distinct, so they never touch each other's rows.
//!
//! # State Transitions
//!
//! ```text
//!            start()                shutdown()
//! Created ───────────→ Running ───────────────→ ShuttingDown ───→ Stopped
//!    │                                                               ↑
//!    └──────────────────────── shutdown() ───────────────────────────┘
//! ```

use crate::config::{EngineConfig, EngineSettings, SyncTaskConfig};
use crate::error::{ReplicationError, Result};
use crate::http::{HttpSource, HttpTarget};
use crate::metrics;
use crate::model::RunVersion;
use crate::orchestrator::{RunSummary, SyncOrchestrator};
use crate::remote::{SourceRef, TargetRef};
use crate::resilience::RateLimiter;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// State of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Built, no cycle scheduled.
    Created,
    /// Interval loop active.
    Running,
    /// Cancellation sent, waiting for in-flight runs.
    ShuttingDown,
    /// Nothing left running. Safe to drop.
    Stopped,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Created => write!(f, "Created"),
            ServiceState::Running => write!(f, "Running"),
            ServiceState::ShuttingDown => write!(f, "ShuttingDown"),
            ServiceState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Result of one task within a cycle.
#[derive(Debug)]
pub struct TaskRun {
    pub task: String,
    pub result: Result<RunSummary>,
}

/// Outcome of running every task once.
#[derive(Debug)]
pub struct CycleReport {
    pub version: RunVersion,
    /// In completion order.
    pub runs: Vec<TaskRun>,
}

impl CycleReport {
    pub fn failed(&self) -> usize {
        self.runs.iter().filter(|run| run.result.is_err()).count()
    }

    pub fn run(&self, task: &str) -> Option<&TaskRun> {
        self.runs.iter().find(|run| run.task == task)
    }
}

/// Everything a cycle needs, shared with the interval loop.
struct CycleRunner {
    tasks: Vec<SyncTaskConfig>,
    settings: EngineSettings,
    source: Arc<dyn SourceRef>,
    target: Arc<dyn TargetRef>,
    limiter: Option<Arc<RateLimiter>>,
    cancel: CancellationToken,
    last_version: Mutex<Option<RunVersion>>,
}

impl CycleRunner {
    /// A version strictly above every version this service handed out.
    fn next_version(&self) -> RunVersion {
        let mut last = match self.last_version.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let version = RunVersion::next_after(*last);
        *last = Some(version);
        version
    }

    async fn run_cycle(&self) -> CycleReport {
        let version = self.next_version();
        let started = Instant::now();
        info!(version = %version, tasks = self.tasks.len(), "Starting sync cycle");

        let drain_timeout = self.settings.drain_timeout_duration();
        let mut set = JoinSet::new();
        for task in &self.tasks {
            let name = task.name.clone();
            let mut orchestrator = SyncOrchestrator::new(
                task.clone(),
                version,
                &self.settings,
                Arc::clone(&self.source),
                Arc::clone(&self.target),
                self.cancel.clone(),
            );
            if let Some(limiter) = &self.limiter {
                orchestrator = orchestrator.with_rate_limiter(Arc::clone(limiter));
            }

            set.spawn(async move {
                let result = orchestrator.run().await;
                orchestrator.finish(drain_timeout).await;
                TaskRun { task: name, result }
            });
        }

        let mut runs = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(run) => runs.push(run),
                Err(e) => {
                    error!(error = %e, "Sync task panicked");
                    runs.push(TaskRun {
                        task: String::from("<panicked>"),
                        result: Err(ReplicationError::Internal(e.to_string())),
                    });
                }
            }
        }

        let report = CycleReport { version, runs };
        let failed = report.failed();
        metrics::record_cycle(report.runs.len(), failed, started.elapsed());
        if failed > 0 {
            warn!(version = %version, failed, "Sync cycle finished with failures");
        } else {
            info!(version = %version, "Sync cycle finished");
        }
        report
    }
}

/// Schedules sync cycles until shut down.
pub struct SyncService {
    runner: Arc<CycleRunner>,
    state_tx: watch::Sender<ServiceState>,
    state_rx: watch::Receiver<ServiceState>,
    handle: Option<JoinHandle<()>>,
}

impl SyncService {
    /// Build a service over the given remotes.
    ///
    /// Fails if the configuration doesn't validate.
    pub fn with_remotes(
        config: EngineConfig,
        source: Arc<dyn SourceRef>,
        target: Arc<dyn TargetRef>,
    ) -> Result<Self> {
        config.validate()?;

        let limiter = config.settings.rate_limit_config().map(|cfg| {
            info!(
                rate_per_sec = cfg.refill_rate,
                burst = cfg.burst_size,
                "Rate limiting enabled for remote calls"
            );
            Arc::new(RateLimiter::new(cfg))
        });

        let (state_tx, state_rx) = watch::channel(ServiceState::Created);
        Ok(Self {
            runner: Arc::new(CycleRunner {
                tasks: config.tasks,
                settings: config.settings,
                source,
                target,
                limiter,
                cancel: CancellationToken::new(),
                last_version: Mutex::new(None),
            }),
            state_tx,
            state_rx,
            handle: None,
        })
    }

    /// Build a service talking HTTP to the configured source and target.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let source = Arc::new(HttpSource::new(&config.settings.remote)?);
        let target = Arc::new(HttpTarget::new(&config.settings.remote)?);
        Self::with_remotes(config, source, target)
    }

    pub fn state(&self) -> ServiceState {
        *self.state_rx.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ServiceState> {
        self.state_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), ServiceState::Running)
    }

    /// Token every run watches; cancelling it aborts in-flight runs.
    pub fn cancel_token(&self) -> CancellationToken {
        self.runner.cancel.clone()
    }

    /// Run every task once, now.
    pub async fn run_once(&self) -> Result<CycleReport> {
        if self.runner.cancel.is_cancelled() {
            return Err(ReplicationError::Shutdown);
        }
        Ok(self.runner.run_cycle().await)
    }

    /// Start the interval loop. The first cycle runs immediately.
    pub fn start(&mut self) -> Result<()> {
        if self.state() != ServiceState::Created {
            return Err(ReplicationError::InvalidState {
                expected: "Created".to_string(),
                actual: self.state().to_string(),
            });
        }

        let interval = self.runner.settings.interval_duration();
        info!(
            tasks = self.runner.tasks.len(),
            interval_secs = interval.as_secs(),
            "Starting sync service"
        );

        let runner = Arc::clone(&self.runner);
        self.handle = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = runner.cancel.cancelled() => {
                        debug!("Interval loop stopping");
                        break;
                    }
                    _ = timer.tick() => {
                        runner.run_cycle().await;
                    }
                }
            }
        }));

        let _ = self.state_tx.send(ServiceState::Running);
        metrics::set_service_state("Running");
        Ok(())
    }

    /// Cancel in-flight runs and wait for them, bounded by the drain timeout.
    pub async fn shutdown(&mut self) {
        info!("Shutting down sync service");
        let _ = self.state_tx.send(ServiceState::ShuttingDown);
        metrics::set_service_state("ShuttingDown");

        self.runner.cancel.cancel();

        if let Some(handle) = self.handle.take() {
            let drain_timeout = self.runner.settings.drain_timeout_duration();
            match tokio::time::timeout(drain_timeout, handle).await {
                Ok(Ok(())) => debug!("Interval loop completed gracefully"),
                Ok(Err(e)) => warn!(error = %e, "Interval loop panicked during shutdown"),
                Err(_) => warn!("Interval loop timed out during shutdown (runs may be cut short)"),
            }
        }

        let _ = self.state_tx.send(ServiceState::Stopped);
        metrics::set_service_state("Stopped");
        info!("Sync service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{BoxFuture, DryRunTarget, ReadRequest, ReadResponse};

    struct EmptySource;

    impl SourceRef for EmptySource {
        fn read(&self, _request: ReadRequest) -> BoxFuture<'_, ReadResponse> {
            Box::pin(async { Ok(ReadResponse::default()) })
        }
    }

    fn service(dir: &std::path::Path, tasks: Vec<SyncTaskConfig>) -> SyncService {
        let config = EngineConfig {
            settings: EngineSettings::for_testing(dir.to_string_lossy()),
            tasks,
        };
        SyncService::with_remotes(config, Arc::new(EmptySource), Arc::new(DryRunTarget)).unwrap()
    }

    #[test]
    fn test_service_initial_state() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), vec![]);
        assert_eq!(svc.state(), ServiceState::Created);
        assert!(!svc.is_running());
        assert_eq!(*svc.state_receiver().borrow(), ServiceState::Created);
    }

    #[test]
    fn test_duplicate_flags_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            settings: EngineSettings::for_testing(dir.path().to_string_lossy()),
            tasks: vec![
                SyncTaskConfig::for_testing("a", "same"),
                SyncTaskConfig::for_testing("b", "same"),
            ],
        };
        let result = SyncService::with_remotes(config, Arc::new(EmptySource), Arc::new(DryRunTarget));
        assert!(matches!(result, Err(ReplicationError::Config(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = EngineSettings::for_testing(dir.path().to_string_lossy());
        settings.interval = "0s".to_string();
        let config = EngineConfig {
            settings,
            tasks: vec![SyncTaskConfig::for_testing("a", "east")],
        };
        let result = SyncService::with_remotes(config, Arc::new(EmptySource), Arc::new(DryRunTarget));
        assert!(matches!(result, Err(ReplicationError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_once_versions_strictly_increase() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(
            dir.path(),
            vec![
                SyncTaskConfig::for_testing("a", "flag-a"),
                SyncTaskConfig::for_testing("b", "flag-b"),
            ],
        );

        let first = svc.run_once().await.unwrap();
        let second = svc.run_once().await.unwrap();
        assert!(second.version > first.version);
        assert_eq!(first.runs.len(), 2);
        assert_eq!(first.failed(), 0);
        assert!(first.run("a").is_some());
        assert!(dir.path().join(format!("flag-b-{}", first.version)).exists());
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = service(dir.path(), vec![]);
        svc.start().unwrap();
        assert!(svc.is_running());

        match svc.start() {
            Err(ReplicationError::InvalidState { expected, actual }) => {
                assert_eq!(expected, "Created");
                assert_eq!(actual, "Running");
            }
            other => panic!("expected InvalidState, got {:?}", other),
        }
        svc.shutdown().await;
        assert_eq!(svc.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_from_created() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = service(dir.path(), vec![]);
        svc.shutdown().await;
        assert_eq!(svc.state(), ServiceState::Stopped);
        assert!(matches!(svc.run_once().await, Err(ReplicationError::Shutdown)));
    }
}
