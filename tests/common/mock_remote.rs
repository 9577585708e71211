//! Mock source and target for driving whole runs in-process.
//!
//! The source serves canned rows per `(data_type, classify)`, applies the
//! condition map it receives, pages with `start`/`limit` and records every
//! read. The target records every push and clear and keeps an idempotent
//! replace store keyed by `(flag, classify, id)`.

use cmdb_replicator::model::{DataType, ExceptionResult, Record, RunVersion};
use cmdb_replicator::remote::{
    BoxFuture, ClearStaleDataRequest, ClearStaleDataResponse, PushRequest, PushResponse,
    ReadRequest, ReadResponse, RemoteError, SourceRef, TargetRef,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Turn `json!` objects into records.
pub fn records(values: Vec<Value>) -> Vec<Record> {
    values
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

/// `n` business rows named `name`, keyed from `first_id`.
pub fn business_rows(first_id: i64, n: usize, name: &str) -> Vec<Record> {
    (0..n as i64)
        .map(|i| {
            let mut row = Map::new();
            row.insert("bk_biz_id".into(), Value::from(first_id + i));
            row.insert("bk_biz_name".into(), Value::from(name));
            row
        })
        .collect()
}

// =============================================================================
// MockSource
// =============================================================================

/// A recorded read.
#[derive(Debug, Clone)]
pub struct ReadCall {
    pub data_type: DataType,
    pub classify: String,
    pub condition: Map<String, Value>,
    pub start: u64,
    pub limit: u64,
}

pub struct MockSource {
    rows: RwLock<HashMap<(DataType, String), Vec<Record>>>,
    reads: RwLock<Vec<ReadCall>>,
    /// Reads of this classify fail with a transport error.
    fail_classify: RwLock<Option<String>>,
    /// Delay applied to every read.
    delay: RwLock<Option<Duration>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            reads: RwLock::new(Vec::new()),
            fail_classify: RwLock::new(None),
            delay: RwLock::new(None),
        }
    }

    pub async fn set_rows(&self, data_type: DataType, classify: &str, rows: Vec<Record>) {
        self.rows
            .write()
            .await
            .insert((data_type, classify.to_string()), rows);
    }

    pub async fn fail_reads_of(&self, classify: &str) {
        *self.fail_classify.write().await = Some(classify.to_string());
    }

    pub async fn heal(&self) {
        *self.fail_classify.write().await = None;
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    pub async fn reads(&self) -> Vec<ReadCall> {
        self.reads.read().await.clone()
    }

    pub async fn reads_of(&self, data_type: DataType, classify: &str) -> Vec<ReadCall> {
        self.reads
            .read()
            .await
            .iter()
            .filter(|r| r.data_type == data_type && r.classify == classify)
            .cloned()
            .collect()
    }

    #[allow(dead_code)]
    pub async fn reset(&self) {
        self.reads.write().await.clear();
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRef for MockSource {
    fn read(&self, request: ReadRequest) -> BoxFuture<'_, ReadResponse> {
        Box::pin(async move {
            self.reads.write().await.push(ReadCall {
                data_type: request.data_type,
                classify: request.classify.clone(),
                condition: request.condition.clone(),
                start: request.start,
                limit: request.limit,
            });

            let delay = *self.delay.read().await;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_classify.read().await.as_deref() == Some(request.classify.as_str()) {
                return Err(RemoteError(format!("source unreachable reading {}", request.classify)));
            }

            let rows = self.rows.read().await;
            let matched: Vec<Record> = rows
                .get(&(request.data_type, request.classify.clone()))
                .map(|all| {
                    all.iter()
                        .filter(|row| matches_condition(row, &request.condition))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            let count = matched.len() as u64;
            let info = matched
                .into_iter()
                .skip(request.start as usize)
                .take(request.limit as usize)
                .collect();
            Ok(ReadResponse { info, count })
        })
    }
}

/// Evaluate a `{field: {"$in"|"$nin"|"$eq"|"$ne": v}}` map against a row.
pub fn matches_condition(row: &Record, condition: &Map<String, Value>) -> bool {
    condition.iter().all(|(field, ops)| {
        let actual = row.get(field).unwrap_or(&Value::Null);
        let Some(ops) = ops.as_object() else {
            return actual == ops;
        };
        ops.iter().all(|(op, expected)| match op.as_str() {
            "$in" => expected.as_array().is_some_and(|list| list.contains(actual)),
            "$nin" => !expected.as_array().is_some_and(|list| list.contains(actual)),
            "$eq" => actual == expected,
            "$ne" => actual != expected,
            _ => false,
        })
    })
}

// =============================================================================
// MockTarget
// =============================================================================

/// A stored row: the version it was last written under plus its body.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub version: RunVersion,
    pub info: Record,
}

pub struct MockTarget {
    pushes: RwLock<Vec<PushRequest>>,
    clears: RwLock<Vec<ClearStaleDataRequest>>,
    /// (flag, classify, id) -> row
    store: RwLock<BTreeMap<(String, String, i64), StoredRow>>,
    /// Pages of this classify are rejected without detail.
    reject_classify: RwLock<Option<(String, i64, String)>>,
    /// Pages of this classify are rejected with one entry per record.
    reject_detail_classify: RwLock<Option<String>>,
    /// Push transport fails once this many pushes succeeded.
    fail_push_after: AtomicUsize,
    fail_clear: RwLock<bool>,
    refuse_clear: RwLock<Option<(i64, String)>>,
}

impl MockTarget {
    pub fn new() -> Self {
        Self {
            pushes: RwLock::new(Vec::new()),
            clears: RwLock::new(Vec::new()),
            store: RwLock::new(BTreeMap::new()),
            reject_classify: RwLock::new(None),
            reject_detail_classify: RwLock::new(None),
            fail_push_after: AtomicUsize::new(usize::MAX),
            fail_clear: RwLock::new(false),
            refuse_clear: RwLock::new(None),
        }
    }

    pub async fn reject_pages_of(&self, classify: &str, code: i64, message: &str) {
        *self.reject_classify.write().await =
            Some((classify.to_string(), code, message.to_string()));
    }

    pub async fn reject_records_of(&self, classify: &str) {
        *self.reject_detail_classify.write().await = Some(classify.to_string());
    }

    pub fn fail_pushes_after(&self, n: usize) {
        self.fail_push_after.store(n, Ordering::SeqCst);
    }

    pub async fn fail_clears(&self) {
        *self.fail_clear.write().await = true;
    }

    pub async fn refuse_clears(&self, code: i64, message: &str) {
        *self.refuse_clear.write().await = Some((code, message.to_string()));
    }

    pub async fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.read().await.clone()
    }

    pub async fn pushes_of(&self, data_type: DataType, classify: &str) -> Vec<PushRequest> {
        self.pushes
            .read()
            .await
            .iter()
            .filter(|p| p.data_type == data_type && p.classify == classify)
            .cloned()
            .collect()
    }

    pub async fn clears(&self) -> Vec<ClearStaleDataRequest> {
        self.clears.read().await.clone()
    }

    /// Snapshot of every stored row.
    pub async fn stored(&self) -> BTreeMap<(String, String, i64), StoredRow> {
        self.store.read().await.clone()
    }

    pub async fn stored_ids(&self, flag: &str, classify: &str) -> Vec<i64> {
        self.store
            .read()
            .await
            .keys()
            .filter(|(f, c, _)| f == flag && c == classify)
            .map(|(_, _, id)| *id)
            .collect()
    }

    async fn apply(&self, request: &PushRequest) {
        let mut store = self.store.write().await;
        for item in &request.items {
            if let Some(id) = item.id {
                store.insert(
                    (request.synchronize_flag.clone(), request.classify.clone(), id),
                    StoredRow {
                        version: request.version,
                        info: item.info.clone(),
                    },
                );
            }
        }
    }
}

impl Default for MockTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetRef for MockTarget {
    fn push(&self, request: PushRequest) -> BoxFuture<'_, PushResponse> {
        Box::pin(async move {
            let succeeded = self.pushes.read().await.len();
            self.pushes.write().await.push(request.clone());
            if succeeded >= self.fail_push_after.load(Ordering::SeqCst) {
                return Err(RemoteError("target unreachable".into()));
            }

            if let Some((classify, code, message)) = self.reject_classify.read().await.clone() {
                if classify == request.classify {
                    return Ok(PushResponse {
                        accepted: false,
                        code,
                        message,
                        exceptions: vec![],
                    });
                }
            }
            if self.reject_detail_classify.read().await.as_deref() == Some(request.classify.as_str()) {
                let exceptions = request
                    .items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        ExceptionResult::new(1_101_001, "duplicate", Value::Object(item.info.clone()), i)
                    })
                    .collect();
                return Ok(PushResponse {
                    accepted: false,
                    code: 1_101_001,
                    message: "duplicate".into(),
                    exceptions,
                });
            }

            self.apply(&request).await;
            Ok(PushResponse::accepted())
        })
    }

    fn clear_stale_data(
        &self,
        request: ClearStaleDataRequest,
    ) -> BoxFuture<'_, ClearStaleDataResponse> {
        Box::pin(async move {
            self.clears.write().await.push(request.clone());
            if *self.fail_clear.read().await {
                return Err(RemoteError("target unreachable".into()));
            }
            if let Some((code, message)) = self.refuse_clear.read().await.clone() {
                return Ok(ClearStaleDataResponse {
                    accepted: false,
                    code,
                    message,
                });
            }
            if !request.verify() {
                return Ok(ClearStaleDataResponse {
                    accepted: false,
                    code: 1_199_001,
                    message: "bad sign".into(),
                });
            }

            self.store.write().await.retain(|(flag, _, _), row| {
                flag != &request.synchronize_flag || row.version >= request.version
            });
            Ok(ClearStaleDataResponse {
                accepted: true,
                ..Default::default()
            })
        })
    }
}
