// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication engine.
//!
//! Errors split into two tiers that drive the engine's failure policy:
//! phase-fatal errors abort the current phase and the whole run, while
//! record-level problems never surface here at all. Those are collected as
//! [`ExceptionResult`](crate::model::ExceptionResult) entries instead.
//!
//! # Error Categories
//!
//! | Error Type | Phase-fatal | Retryable | Description |
//! |------------|-------------|-----------|-------------|
//! | `Transport` | Yes | Yes | Source read, target write or clear call failed |
//! | `Cancelled` | Yes | No | Caller cancelled the run mid-call |
//! | `Config` | No | No | Configuration invalid |
//! | `ExceptionLog` | No | No | Exception sink I/O (logged only) |
//! | `Serialization` | No | No | JSON encoding failed |
//! | `InvalidState` | No | No | Lifecycle misuse |
//! | `Shutdown` | No | No | Service is shutting down |
//! | `Internal` | No | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Nothing inside a run retries. A retryable error means a *later run* under a
//! fresh version is expected to converge, thanks to replace-by-version writes
//! and stale-data clearance.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur during a replication run.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// A remote call failed at the transport level.
    ///
    /// Covers the source read, the target push and the clear-stale-data call.
    /// Fatal to the current phase; the run aborts and already-pushed pages
    /// stay committed on the target.
    #[error("Transport error ({operation}): {message}")]
    Transport { operation: String, message: String },

    /// The caller's cancellation signal fired while a remote call was in flight.
    #[error("Cancelled during {operation}")]
    Cancelled { operation: String },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Exception log could not be created, written or pruned.
    ///
    /// Callers log this and move on; it never fails a run.
    #[error("Exception log error ({path}): {source}")]
    ExceptionLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Lifecycle violation (e.g. starting a service twice).
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Shutdown in progress.
    #[error("Shutdown in progress")]
    Shutdown,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create a transport error for a named remote operation.
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error for a named remote operation.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Wrap an I/O error from the exception sink.
    pub fn exception_log(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ExceptionLog {
            path: path.into(),
            source,
        }
    }

    /// Check if a later run is expected to succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Cancelled { .. } => false,
            Self::Config(_) => false,
            Self::ExceptionLog { .. } => false,
            Self::Serialization(_) => false,
            Self::InvalidState { .. } => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this error aborts the current phase (and therefore the run).
    pub fn is_phase_fatal(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Cancelled { .. })
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Cancelled { .. } => "cancelled",
            Self::Config(_) => "config",
            Self::ExceptionLog { .. } => "exception_log",
            Self::Serialization(_) => "serialization",
            Self::InvalidState { .. } => "invalid_state",
            Self::Shutdown => "shutdown",
            Self::Internal(_) => "internal",
        }
    }
}
