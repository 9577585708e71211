// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Domain vocabulary shared by fetchers, the pusher and the orchestrator.
//!
//! Entity classifications are plain strings on the wire (custom object types
//! are allowed), so the built-in ones are exposed as constants rather than an
//! enum. Key-field lookup and key conversion live here because both the
//! pusher and the fuzz target need them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One structured row as read from the source.
pub type Record = Map<String, Value>;

// ═══════════════════════════════════════════════════════════════════════════════
// Entity classifications
// ═══════════════════════════════════════════════════════════════════════════════

pub const OBJ_BUSINESS: &str = "biz";
pub const OBJ_SET: &str = "set";
pub const OBJ_MODULE: &str = "module";
pub const OBJ_HOST: &str = "host";
pub const OBJ_PROCESS: &str = "process";
pub const OBJ_PLATFORM: &str = "plat";

/// Object types every whitelist implicitly contains.
pub const BUILTIN_OBJECTS: [&str; 6] = [
    OBJ_BUSINESS,
    OBJ_SET,
    OBJ_MODULE,
    OBJ_HOST,
    OBJ_PROCESS,
    OBJ_PLATFORM,
];

/// Instance types that are never replicated.
pub const OBJ_CONFIG_TEMPLATE: &str = "config_template";
pub const OBJ_TEMPLATE_VERSION: &str = "template_version";

pub const MODEL_BASE: &str = "model";
pub const MODEL_ATTRIBUTE: &str = "attribute";
pub const MODEL_ATTRIBUTE_GROUP: &str = "attribute_group";
pub const MODEL_CLASSIFICATION: &str = "classification";

/// Host-to-module placement, the only relation type replicated.
pub const ASSOCIATION_MODULE_HOST: &str = "module_host_config";

// ═══════════════════════════════════════════════════════════════════════════════
// Field names
// ═══════════════════════════════════════════════════════════════════════════════

pub const FIELD_ID: &str = "id";
pub const FIELD_INST_ID: &str = "bk_inst_id";
pub const FIELD_BIZ_ID: &str = "bk_biz_id";
pub const FIELD_BIZ_NAME: &str = "bk_biz_name";
pub const FIELD_BIZ_DEFAULT: &str = "default";
pub const FIELD_OBJ_ID: &str = "bk_obj_id";
pub const FIELD_CLASSIFICATION_ID: &str = "bk_classification_id";
pub const FIELD_SYNCHRONIZE_SIGN: &str = "bk_synchronize_sign";

/// `bk_synchronize_sign` value meaning "applies to every target".
pub const SYNCHRONIZE_SIGN_ALL: &str = "*";

/// `default` value marking the resource-pool business.
pub const RESOURCE_POOL_DEFAULT: i64 = 1;

/// Primary-key field for an instance classification.
pub fn instance_key_field(obj_id: &str) -> &'static str {
    match obj_id {
        OBJ_BUSINESS => FIELD_BIZ_ID,
        OBJ_SET => "bk_set_id",
        OBJ_MODULE => "bk_module_id",
        OBJ_HOST => "bk_host_id",
        OBJ_PROCESS => "bk_process_id",
        OBJ_PLATFORM => "bk_cloud_id",
        _ => FIELD_INST_ID,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DataType
// ═══════════════════════════════════════════════════════════════════════════════

/// Which family of rows a read or write concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Instance,
    Model,
    Association,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Instance => "instance",
            DataType::Model => "model",
            DataType::Association => "association",
        }
    }

    /// Primary-key field for a classification within this data type.
    pub fn key_field(&self, classify: &str) -> &'static str {
        match self {
            DataType::Instance => instance_key_field(classify),
            DataType::Model | DataType::Association => FIELD_ID,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RunVersion
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-run token: the replace key for pushes and the staleness threshold for clearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunVersion(pub i64);

impl RunVersion {
    /// Version derived from the wall clock (unix seconds).
    pub fn now() -> Self {
        Self(unix_now())
    }

    /// The next version strictly greater than `previous`, preferring the wall clock.
    pub fn next_after(previous: Option<RunVersion>) -> Self {
        let now = unix_now();
        match previous {
            Some(RunVersion(prev)) if prev >= now => Self(prev + 1),
            _ => Self(now),
        }
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RunVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ExceptionResult
// ═══════════════════════════════════════════════════════════════════════════════

/// A record's key field was missing or not convertible to an integer.
pub const CODE_FIELD_CONVERSION_FAILED: i64 = 1_199_013;
/// The target rejected a page without per-record detail.
pub const CODE_PUSH_REJECTED: i64 = 1_199_050;
/// The clear-stale-data call failed at the transport level.
pub const CODE_CLEAR_TRANSPORT_FAILED: i64 = 1_199_051;

/// One record-level problem, produced at push time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionResult {
    pub code: i64,
    pub message: String,
    /// The offending payload (a record, a whole page, or null).
    #[serde(default)]
    pub data: Value,
    /// Index of the offending record within its page.
    #[serde(default)]
    pub position: usize,
}

impl ExceptionResult {
    pub fn new(code: i64, message: impl Into<String>, data: Value, position: usize) -> Self {
        Self {
            code,
            message: message.into(),
            data,
            position,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Key extraction
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a key could not be taken from a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("field {field} is missing")]
    Missing { field: String },
    #[error("field {field} value {value} is not convertible to int64")]
    NotInteger { field: String, value: String },
}

/// Read an int64 key from `record[field]`.
///
/// Accepts JSON integers, floats with no fractional part, and decimal strings.
pub fn extract_key(record: &Record, field: &str) -> std::result::Result<i64, KeyError> {
    let value = record.get(field).ok_or_else(|| KeyError::Missing {
        field: field.to_string(),
    })?;
    let not_integer = || KeyError::NotInteger {
        field: field.to_string(),
        value: value.to_string(),
    };

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Ok(f as i64)
                } else {
                    Err(not_integer())
                }
            } else {
                Err(not_integer())
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| not_integer()),
        Value::Null => Err(KeyError::Missing {
            field: field.to_string(),
        }),
        _ => Err(not_integer()),
    }
}

/// Read an optional non-empty string field.
pub fn string_field<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
