// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Source and target integration traits.
//!
//! The engine reaches the two CMDB nodes only through request/response
//! calls. [`SourceRef`] is the single read path; [`TargetRef`] accepts
//! versioned replace writes and stale-data clearance. Both are object-safe
//! so a service can hold `Arc<dyn SourceRef>` and swap in mocks for tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use cmdb_replicator::remote::{SourceRef, ReadRequest, ReadResponse, BoxFuture};
//!
//! struct EmptySource;
//!
//! impl SourceRef for EmptySource {
//!     fn read(&self, _request: ReadRequest) -> BoxFuture<'_, ReadResponse> {
//!         Box::pin(async move { Ok(ReadResponse::default()) })
//!     }
//! }
//! ```
//!
//! Every call made by the engine goes through a [`CallContext`], which binds
//! it to the run's cancellation token and the optional shared rate limiter,
//! and converts [`RemoteError`] into a phase-fatal
//! [`ReplicationError`](crate::error::ReplicationError).

use crate::error::{ReplicationError, Result};
use crate::model::{DataType, ExceptionResult, Record, RunVersion};
use crate::resilience::RateLimiter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result type for remote operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

/// Simplified error for remote operations.
#[derive(Debug, Clone)]
pub struct RemoteError(pub String);

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RemoteError {}

/// Prefix mixed into the clear-request signature.
pub const CLEAR_SIGN_PREFIX: &str = "cmdb_sync";

// ═══════════════════════════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════════════════════════

/// One paginated read against the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub data_type: DataType,
    /// Entity classification, e.g. `host` or `attribute`.
    pub classify: String,
    /// Rendered [`Filter`](crate::filter::Filter) condition map.
    #[serde(default)]
    pub condition: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supplier_accounts: Vec<String>,
    pub start: u64,
    pub limit: u64,
}

/// One page of rows plus the total the source holds for the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse {
    #[serde(default)]
    pub info: Vec<Record>,
    #[serde(default)]
    pub count: u64,
}

/// Write mode for a push. Only replace is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOperation {
    #[default]
    Replace,
}

/// A record plus its extracted key (`None` when extraction failed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushItem {
    pub id: Option<i64>,
    pub info: Record,
}

/// One page, written as a single replace under `{synchronize_flag, version}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub operate: PushOperation,
    pub data_type: DataType,
    pub classify: String,
    pub version: RunVersion,
    pub synchronize_flag: String,
    pub items: Vec<PushItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    /// Per-record rejections; may be empty even when `accepted` is false.
    #[serde(default)]
    pub exceptions: Vec<ExceptionResult>,
}

impl PushResponse {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            ..Default::default()
        }
    }
}

/// Delete target rows tagged with `synchronize_flag` and older than `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearStaleDataRequest {
    pub version: RunVersion,
    pub synchronize_flag: String,
    pub timestamp: i64,
    pub sign: String,
}

impl ClearStaleDataRequest {
    /// Build a request signed for `timestamp`.
    pub fn signed(version: RunVersion, synchronize_flag: &str, timestamp: i64) -> Self {
        Self {
            version,
            synchronize_flag: synchronize_flag.to_string(),
            timestamp,
            sign: clear_sign(synchronize_flag, version, timestamp),
        }
    }

    /// Check the signature against the other fields.
    pub fn verify(&self) -> bool {
        self.sign == clear_sign(&self.synchronize_flag, self.version, self.timestamp)
    }
}

/// `hex(sha256(prefix || flag || version || timestamp))`
pub fn clear_sign(synchronize_flag: &str, version: RunVersion, timestamp: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(CLEAR_SIGN_PREFIX.as_bytes());
    hasher.update(synchronize_flag.as_bytes());
    hasher.update(version.get().to_string().as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClearStaleDataResponse {
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════════════════════════════════════════

/// The engine's only read path.
pub trait SourceRef: Send + Sync + 'static {
    /// Read one page. Errors mean the call itself failed.
    fn read(&self, request: ReadRequest) -> BoxFuture<'_, ReadResponse>;
}

/// Where replicated rows are written.
///
/// Both calls must be idempotent for a given `{synchronize_flag, version}`.
pub trait TargetRef: Send + Sync + 'static {
    /// Replace-write one page.
    fn push(&self, request: PushRequest) -> BoxFuture<'_, PushResponse>;

    /// Remove rows from earlier versions of this flag.
    fn clear_stale_data(&self, request: ClearStaleDataRequest)
        -> BoxFuture<'_, ClearStaleDataResponse>;
}

/// A target that logs and accepts every write.
///
/// Used for standalone smoke runs against a real source.
#[derive(Debug, Clone, Default)]
pub struct DryRunTarget;

impl TargetRef for DryRunTarget {
    fn push(&self, request: PushRequest) -> BoxFuture<'_, PushResponse> {
        Box::pin(async move {
            tracing::debug!(
                data_type = %request.data_type,
                classify = %request.classify,
                version = %request.version,
                flag = %request.synchronize_flag,
                records = request.items.len(),
                "DryRun: would push page"
            );
            Ok(PushResponse::accepted())
        })
    }

    fn clear_stale_data(
        &self,
        request: ClearStaleDataRequest,
    ) -> BoxFuture<'_, ClearStaleDataResponse> {
        Box::pin(async move {
            tracing::debug!(
                version = %request.version,
                flag = %request.synchronize_flag,
                "DryRun: would clear stale data"
            );
            Ok(ClearStaleDataResponse {
                accepted: true,
                ..Default::default()
            })
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CallContext
// ═══════════════════════════════════════════════════════════════════════════════

/// Binds remote calls to a run's cancellation token and the shared limiter.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    limiter: Option<Arc<RateLimiter>>,
}

impl CallContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            limiter: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run one remote call.
    ///
    /// Returns `Cancelled` if the token fires before or during the call and
    /// `Transport` if the call fails.
    pub async fn call<'a, T>(&self, operation: &'static str, fut: BoxFuture<'a, T>) -> Result<T> {
        if self.cancel.is_cancelled() {
            return Err(ReplicationError::cancelled(operation));
        }

        if let Some(limiter) = &self.limiter {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(ReplicationError::cancelled(operation));
                }
                _ = limiter.acquire() => {}
            }
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                crate::metrics::record_remote_error(operation, "cancelled");
                Err(ReplicationError::cancelled(operation))
            }
            result = fut => result.map_err(|e| {
                crate::metrics::record_remote_error(operation, "transport");
                ReplicationError::transport(operation, e.0)
            }),
        }
    }
}
