//! Configuration for the replication engine.
//!
//! Configuration is loaded once before a run starts and never hot-reloaded
//! mid-run. It can be constructed programmatically or deserialized from JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use cmdb_replicator::config::{EngineConfig, SyncTaskConfig};
//!
//! let config = EngineConfig {
//!     tasks: vec![SyncTaskConfig::for_testing("east", "flag-east")],
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! EngineConfig
//! ├── settings: EngineSettings
//! │   ├── page_size: u64             # rows per fetch (default 100)
//! │   ├── exception_dir: String      # where per-run exception logs go
//! │   ├── interval: String           # scheduled cadence, e.g. "24h"
//! │   ├── drain_timeout: String      # shutdown join timeout, e.g. "10s"
//! │   ├── rate_limit_*               # optional throttle on remote calls
//! │   └── remote: RemoteConfig       # source/target endpoints
//! └── tasks: Vec<SyncTaskConfig>     # one per independent sync pipeline
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "settings": {
//!     "page_size": 100,
//!     "exception_dir": "/var/log/cmdb-sync",
//!     "interval": "24h",
//!     "remote": {
//!       "source_url": "http://cmdb-source:8080",
//!       "target_url": "http://cmdb-target:8080"
//!     }
//!   },
//!   "tasks": [
//!     {
//!       "name": "east",
//!       "synchronize_flag": "east-dc",
//!       "whitelist": true,
//!       "object_ids": ["switch"],
//!       "business_names": ["Alpha"]
//!     }
//!   ]
//! }
//! ```

use crate::error::{ReplicationError, Result};
use crate::model::BUILTIN_OBJECTS;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a [`SyncService`](crate::service::SyncService) needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub settings: EngineSettings,

    /// Independent sync pipelines; each owns its synchronize flag.
    #[serde(default)]
    pub tasks: Vec<SyncTaskConfig>,
}

impl EngineConfig {
    /// Parse from a JSON string and validate.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file and validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReplicationError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Check settings and every task, including cross-task uniqueness.
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;

        let mut names = HashSet::new();
        let mut flags = HashSet::new();
        for task in &self.tasks {
            task.validate()?;
            if !names.insert(task.name.as_str()) {
                return Err(ReplicationError::Config(format!(
                    "duplicate task name: {}",
                    task.name
                )));
            }
            if !flags.insert(task.synchronize_flag.as_str()) {
                return Err(ReplicationError::Config(format!(
                    "duplicate synchronize_flag: {}",
                    task.synchronize_flag
                )));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EngineSettings
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine-wide tunables shared by every task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Rows requested per fetch call.
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Directory holding one exception log per run.
    #[serde(default = "default_exception_dir")]
    pub exception_dir: String,

    /// How often the service starts a new cycle (duration string).
    #[serde(default = "default_interval")]
    pub interval: String,

    /// How long shutdown waits for in-flight work (duration string).
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: String,

    /// Throttle remote calls across all tasks.
    #[serde(default)]
    pub rate_limit_enabled: bool,

    /// Sustained remote calls per second.
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: u32,

    /// Burst size above the sustained rate.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,

    #[serde(default)]
    pub remote: RemoteConfig,
}

fn default_page_size() -> u64 {
    100
}

fn default_exception_dir() -> String {
    "exceptions".to_string()
}

fn default_interval() -> String {
    "24h".to_string()
}

fn default_drain_timeout() -> String {
    "10s".to_string()
}

fn default_rate_limit_per_sec() -> u32 {
    50
}

fn default_rate_limit_burst() -> u32 {
    10
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            exception_dir: "exceptions".to_string(),
            interval: "24h".to_string(),
            drain_timeout: "10s".to_string(),
            rate_limit_enabled: false,
            rate_limit_per_sec: 50,
            rate_limit_burst: 10,
            remote: RemoteConfig::default(),
        }
    }
}

impl EngineSettings {
    /// Settings for tests: exceptions go to `exception_dir`, tiny timeouts.
    pub fn for_testing(exception_dir: impl Into<String>) -> Self {
        Self {
            exception_dir: exception_dir.into(),
            interval: "1s".to_string(),
            drain_timeout: "1s".to_string(),
            ..Default::default()
        }
    }

    /// Scheduled cadence; falls back to 24 hours on a bad string.
    pub fn interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.interval).unwrap_or(Duration::from_secs(24 * 60 * 60))
    }

    /// Shutdown drain timeout; falls back to 10 seconds on a bad string.
    pub fn drain_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.drain_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Rate limit configuration, or `None` when disabled.
    pub fn rate_limit_config(&self) -> Option<crate::resilience::RateLimitConfig> {
        if self.rate_limit_enabled {
            Some(crate::resilience::RateLimitConfig {
                burst_size: self.rate_limit_burst,
                refill_rate: self.rate_limit_per_sec,
            })
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ReplicationError::Config("page_size must be > 0".to_string()));
        }
        if self.exception_dir.trim().is_empty() {
            return Err(ReplicationError::Config(
                "exception_dir must not be empty".to_string(),
            ));
        }
        let interval = parse_duration_field("interval", &self.interval)?;
        if interval.is_zero() {
            return Err(ReplicationError::Config("interval must be > 0".to_string()));
        }
        parse_duration_field("drain_timeout", &self.drain_timeout)?;
        Ok(())
    }
}

fn parse_duration_field(name: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| ReplicationError::Config(format!("{name} {value:?} is not a duration: {e}")))
}

// ═══════════════════════════════════════════════════════════════════════════════
// RemoteConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Endpoints for the HTTP source and target services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_source_url")]
    pub source_url: String,

    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// Per-request timeout (duration string).
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// TCP connect timeout (duration string).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

fn default_source_url() -> String {
    "http://127.0.0.1:50001".to_string()
}

fn default_target_url() -> String {
    "http://127.0.0.1:50002".to_string()
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

fn default_connect_timeout() -> String {
    "5s".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            target_url: default_target_url(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(30))
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(5))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SyncTaskConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Scope and filters for one sync pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTaskConfig {
    pub name: String,

    /// `true`: `object_ids` lists what to copy. `false`: what to skip.
    #[serde(default)]
    pub whitelist: bool,

    #[serde(default)]
    pub object_ids: BTreeSet<String>,

    /// Business-name filter; follows `whitelist` polarity.
    #[serde(default)]
    pub business_names: BTreeSet<String>,

    /// Supplier accounts this task is scoped to (passed through to the source).
    #[serde(default)]
    pub supplier_accounts: BTreeSet<String>,

    /// Include the resource-pool business.
    #[serde(default)]
    pub sync_resource_pool: bool,

    /// Stable identifier of this pipeline on the target.
    pub synchronize_flag: String,

    /// Discover models but never push them.
    #[serde(default)]
    pub ignore_model_attributes: bool,

    /// Restrict every instance query to rows tagged for this flag (or for all).
    #[serde(default)]
    pub enable_instance_filter: bool,

    /// Exception logs kept per flag.
    #[serde(default = "default_exception_retain_count")]
    pub exception_retain_count: usize,
}

fn default_exception_retain_count() -> usize {
    10
}

impl SyncTaskConfig {
    /// Minimal task for tests: blacklist mode, nothing excluded.
    pub fn for_testing(name: &str, synchronize_flag: &str) -> Self {
        Self {
            name: name.to_string(),
            whitelist: false,
            object_ids: BTreeSet::new(),
            business_names: BTreeSet::new(),
            supplier_accounts: BTreeSet::new(),
            sync_resource_pool: false,
            synchronize_flag: synchronize_flag.to_string(),
            ignore_model_attributes: false,
            enable_instance_filter: false,
            exception_retain_count: 10,
        }
    }

    /// Add the built-in object types to a non-empty whitelist.
    ///
    /// Returns `true` if anything was added.
    pub fn expand_builtin_objects(&mut self) -> bool {
        if !self.whitelist || self.object_ids.is_empty() {
            return false;
        }
        let before = self.object_ids.len();
        self.object_ids
            .extend(BUILTIN_OBJECTS.iter().map(|s| s.to_string()));
        self.object_ids.len() != before
    }

    /// Whether `obj_id` is in scope under the whitelist/blacklist rules.
    pub fn includes_object(&self, obj_id: &str) -> bool {
        if self.object_ids.is_empty() {
            return true;
        }
        self.object_ids.contains(obj_id) == self.whitelist
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ReplicationError::Config("task name must not be empty".to_string()));
        }
        if self.synchronize_flag.trim().is_empty() {
            return Err(ReplicationError::Config(format!(
                "task {}: synchronize_flag must not be empty",
                self.name
            )));
        }
        if self
            .synchronize_flag
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(ReplicationError::Config(format!(
                "task {}: synchronize_flag contains a path separator",
                self.name
            )));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
