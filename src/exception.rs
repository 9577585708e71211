// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-run exception log with bounded retention.
//!
//! Each run writes one file named `{synchronize_flag}-{version}` under the
//! configured directory:
//!
//! ```text
//! synchronize instance exception start
//! {"code":1199013,"message":"convert biz field bk_biz_id ...","data":{...},"position":0}
//! synchronize instance exception end
//! synchronize clear_data exception start
//! {"code":1199051,"message":"...","data":null,"position":0}
//! synchronize clear_data exception end
//! ```
//!
//! Recording is best-effort. If the file can't be created the run's
//! exceptions are dropped with a warning; a line that fails to serialize or
//! write is skipped and the rest still go out.
//!
//! After the log is closed a [`RetentionTask`] prunes older logs of the same
//! flag in the background, keeping the newest `retain` files.

use crate::error::{ReplicationError, Result};
use crate::model::RunVersion;
use crate::orchestrator::ExceptionReport;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Log file name for a run.
pub fn log_file_name(synchronize_flag: &str, version: RunVersion) -> String {
    format!("{}-{}", synchronize_flag, version)
}

/// Durable sink for one run's [`ExceptionReport`].
#[derive(Debug, Clone)]
pub struct ExceptionSink {
    dir: PathBuf,
    synchronize_flag: String,
    version: RunVersion,
    retain: usize,
}

/// What a flush managed to write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub entries_written: usize,
    pub entries_skipped: usize,
}

impl ExceptionSink {
    pub fn new(
        dir: impl Into<PathBuf>,
        synchronize_flag: &str,
        version: RunVersion,
        retain: usize,
    ) -> Self {
        Self {
            dir: dir.into(),
            synchronize_flag: synchronize_flag.to_string(),
            version,
            retain,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir
            .join(log_file_name(&self.synchronize_flag, self.version))
    }

    /// Write every bucket of `report`, start marker first and end marker last.
    ///
    /// Only creating the directory or the file can fail this call.
    pub async fn write_report(&self, report: &ExceptionReport) -> Result<WriteStats> {
        let path = self.path();
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ReplicationError::exception_log(&self.dir, e))?;
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ReplicationError::exception_log(&path, e))?;
        let mut writer = BufWriter::new(file);
        let mut stats = WriteStats::default();

        for (phase, entries) in report.buckets() {
            write_line(
                &mut writer,
                &path,
                &format!("synchronize {} exception start", phase),
            )
            .await;

            for entry in entries {
                let line = match serde_json::to_string(entry) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(path = %path.display(), phase = %phase, error = %e, "Failed to serialize exception entry");
                        stats.entries_skipped += 1;
                        continue;
                    }
                };
                if write_line(&mut writer, &path, &line).await {
                    stats.entries_written += 1;
                } else {
                    stats.entries_skipped += 1;
                }
            }

            write_line(
                &mut writer,
                &path,
                &format!("synchronize {} exception end", phase),
            )
            .await;
        }

        if let Err(e) = writer.flush().await {
            warn!(path = %path.display(), error = %e, "Failed to flush exception log");
            crate::metrics::record_exception_sink_failure("flush");
        }

        debug!(
            path = %path.display(),
            written = stats.entries_written,
            skipped = stats.entries_skipped,
            "Exception log written"
        );
        Ok(stats)
    }

    /// Start pruning older logs of this flag in the background.
    pub fn spawn_retention(&self) -> RetentionTask {
        RetentionTask::spawn(self.dir.clone(), self.synchronize_flag.clone(), self.retain)
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, path: &Path, line: &str) -> bool {
    let result = async {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await
    }
    .await;
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to write exception log line");
            crate::metrics::record_exception_sink_failure("write");
            false
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Retention
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether `name` is a log file of `synchronize_flag`.
fn is_log_of(name: &str, synchronize_flag: &str) -> bool {
    name.strip_prefix(synchronize_flag)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|version| !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()))
}

/// Delete the oldest logs of `synchronize_flag` beyond the newest `retain`.
///
/// Logs are ordered by file name. A `retain` of zero keeps everything.
/// Returns the paths removed.
pub async fn prune_logs(dir: &Path, synchronize_flag: &str, retain: usize) -> Result<Vec<PathBuf>> {
    if retain == 0 {
        return Ok(Vec::new());
    }

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ReplicationError::exception_log(dir, e))?;
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ReplicationError::exception_log(dir, e))?
    {
        if let Some(name) = entry.file_name().to_str() {
            if is_log_of(name, synchronize_flag) {
                names.push(name.to_string());
            }
        }
    }

    if names.len() <= retain {
        return Ok(Vec::new());
    }
    names.sort();

    let excess = names.len() - retain;
    let mut removed = Vec::with_capacity(excess);
    for name in names.into_iter().take(excess) {
        let path = dir.join(&name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed.push(path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove old exception log");
                crate::metrics::record_exception_sink_failure("prune");
            }
        }
    }
    Ok(removed)
}

/// Background pruning owned by the run that spawned it.
///
/// Failures are logged and never surface to the run.
#[derive(Debug)]
pub struct RetentionTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl RetentionTask {
    fn spawn(dir: PathBuf, synchronize_flag: String, retain: usize) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(flag = %synchronize_flag, "Retention cancelled");
                }
                result = prune_logs(&dir, &synchronize_flag, retain) => match result {
                    Ok(removed) => {
                        crate::metrics::record_retention_pruned(&synchronize_flag, removed.len());
                        if !removed.is_empty() {
                            info!(flag = %synchronize_flag, removed = removed.len(), retain, "Pruned old exception logs");
                        }
                    }
                    Err(e) => {
                        warn!(flag = %synchronize_flag, error = %e, "Exception log retention failed");
                        crate::metrics::record_exception_sink_failure("prune");
                    }
                },
            }
        });

        Self { handle, cancel }
    }

    /// Wait up to `timeout`; cancels the task if it hasn't finished by then.
    ///
    /// Returns `true` if the task finished on its own.
    pub async fn join(self, timeout: Duration) -> bool {
        let RetentionTask { mut handle, cancel } = self;
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Retention task panicked");
                false
            }
            Err(_) => {
                warn!("Retention task timed out, cancelling");
                cancel.cancel();
                let _ = handle.await;
                false
            }
        }
    }
}
