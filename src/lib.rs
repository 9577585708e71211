//! # CMDB Replicator
//!
//! Versioned batch replication of CMDB data from a source node to a target
//! node.
//!
//! ## Architecture
//!
//! Each configured task owns a synchronize flag. A run tags every row it
//! writes with `{flag, version}`, then asks the target to drop rows of that
//! flag with an older version:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              cmdb-replicator                              │
//! │                                                                           │
//! │  ┌─────────────┐    ┌──────────────────┐    ┌──────────────────────────┐  │
//! │  │ SyncService │───►│ SyncOrchestrator │───►│ Fetchers ──► RecordPusher│  │
//! │  │ (interval)  │    │ (one per task)   │    │ (page by page)           │  │
//! │  └─────────────┘    └──────────────────┘    └──────────────────────────┘  │
//! │                              │                           │                │
//! │                              ▼                           ▼                │
//! │                     ┌─────────────────┐       ┌─────────────────────┐     │
//! │                     │ ExceptionSink   │       │ ClearStaleData      │     │
//! │                     │ (log+retention) │       │ (signed, per flag)  │     │
//! │                     └─────────────────┘       └─────────────────────┘     │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Phases
//!
//! 1. **Instance**: businesses first, then sets, modules, processes, hosts,
//!    clouds and whitelisted custom objects
//! 2. **Model**: models, attributes, attribute groups, classifications
//! 3. **Association**: host-to-module placement
//! 4. **Clear stale data**: one call per run
//! 5. **Report**: exception log plus background retention
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cmdb_replicator::{EngineConfig, SyncService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = EngineConfig::from_json_file("replicator.json").expect("bad config");
//!     let mut service = SyncService::from_config(config).expect("Failed to build");
//!     service.start().expect("Failed to start");
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
//!     service.shutdown().await;
//! }
//! ```

pub mod config;
pub mod error;
pub mod exception;
pub mod fetch;
pub mod filter;
pub mod http;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod pusher;
pub mod remote;
pub mod resilience;
pub mod service;

// Re-exports for convenience
pub use config::{EngineConfig, EngineSettings, RemoteConfig, SyncTaskConfig};
pub use error::{ReplicationError, Result};
pub use exception::{ExceptionSink, RetentionTask};
pub use filter::{Condition, Filter};
pub use http::{HttpSource, HttpTarget};
pub use model::{DataType, ExceptionResult, Record, RunVersion};
pub use orchestrator::{DiscoveredState, ExceptionReport, Phase, RunState, RunSummary, SyncOrchestrator};
pub use pusher::RecordPusher;
pub use remote::{CallContext, DryRunTarget, SourceRef, TargetRef};
pub use service::{CycleReport, ServiceState, SyncService};
