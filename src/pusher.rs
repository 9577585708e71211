// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record pusher: one fetched page becomes one replace write on the target.
//!
//! # Design
//!
//! ```text
//! Page ──▶ prepare() ──┬──▶ PushItem { id, info } for every record
//!                      │      (id = None when the key can't be read)
//!                      ├──▶ keys that converted cleanly
//!                      └──▶ one ExceptionResult per failed key
//!                                   │
//!                                   ▼
//!                       submit() ── one PushRequest ──▶ TargetRef::push
//!                                   │
//!                                   ▼
//!                       PushOutcome { keys, exceptions }
//! ```
//!
//! Records with a bad key are still forwarded. A transport failure fails the
//! whole call; a rejection with no per-record detail becomes one exception
//! carrying the whole page.

use crate::error::Result;
use crate::fetch::Page;
use crate::model::{
    extract_key, DataType, ExceptionResult, Record, RunVersion, CODE_FIELD_CONVERSION_FAILED,
    CODE_PUSH_REJECTED,
};
use crate::remote::{CallContext, PushItem, PushOperation, PushRequest, TargetRef};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// A page ready to push.
#[derive(Debug, Clone)]
pub struct PreparedPage {
    pub data_type: DataType,
    pub classify: String,
    pub items: Vec<PushItem>,
    /// Keys that were extracted successfully, in page order.
    pub keys: Vec<i64>,
    /// Key extraction failures.
    pub exceptions: Vec<ExceptionResult>,
}

impl PreparedPage {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Result of pushing one page.
#[derive(Debug, Default)]
pub struct PushOutcome {
    /// Keys extracted from the page (only populated from successful conversions).
    pub keys: Vec<i64>,
    /// Key failures plus anything the target rejected.
    pub exceptions: Vec<ExceptionResult>,
    /// Records carried by the write.
    pub pushed: usize,
}

/// Writes pages for one run under its `{synchronize_flag, version}`.
pub struct RecordPusher {
    target: Arc<dyn TargetRef>,
    version: RunVersion,
    synchronize_flag: String,
}

impl RecordPusher {
    pub fn new(target: Arc<dyn TargetRef>, version: RunVersion, synchronize_flag: &str) -> Self {
        Self {
            target,
            version,
            synchronize_flag: synchronize_flag.to_string(),
        }
    }

    /// Extract keys and build push items without touching the target.
    pub fn prepare(&self, data_type: DataType, page: Page) -> PreparedPage {
        let classify = page.classify;
        let key_field = data_type.key_field(&classify);
        let mut prepared = PreparedPage {
            data_type,
            classify,
            items: Vec::with_capacity(page.records.len()),
            keys: Vec::new(),
            exceptions: Vec::new(),
        };

        for (position, record) in page.records.into_iter().enumerate() {
            let id = match extract_key(&record, key_field) {
                Ok(id) => {
                    prepared.keys.push(id);
                    Some(id)
                }
                Err(e) => {
                    warn!(
                        classify = %prepared.classify,
                        field = key_field,
                        position,
                        error = %e,
                        "Key conversion failed, forwarding record without key"
                    );
                    prepared.exceptions.push(ExceptionResult::new(
                        CODE_FIELD_CONVERSION_FAILED,
                        format!(
                            "convert {} field {} to int64 failed: {}",
                            prepared.classify, key_field, e
                        ),
                        Value::Object(record.clone()),
                        position,
                    ));
                    None
                }
            };
            prepared.items.push(PushItem { id, info: record });
        }

        prepared
    }

    /// Send a prepared page as one replace write.
    ///
    /// Empty pages are not sent.
    #[instrument(skip(self, ctx, prepared), fields(classify = %prepared.classify, records = prepared.items.len()))]
    pub async fn submit(&self, ctx: &CallContext, prepared: PreparedPage) -> Result<PushOutcome> {
        let PreparedPage {
            data_type,
            classify,
            items,
            keys,
            mut exceptions,
        } = prepared;

        if items.is_empty() {
            return Ok(PushOutcome {
                keys,
                exceptions,
                pushed: 0,
            });
        }

        let pushed = items.len();
        let request = PushRequest {
            operate: PushOperation::Replace,
            data_type,
            classify: classify.clone(),
            version: self.version,
            synchronize_flag: self.synchronize_flag.clone(),
            items,
        };
        // Kept for the aggregate exception if the page is rejected wholesale.
        let records: Vec<Value> = request
            .items
            .iter()
            .map(|item| Value::Object(item.info.clone()))
            .collect();

        let started = Instant::now();
        let response = ctx.call("push", self.target.push(request)).await?;
        crate::metrics::record_push(
            data_type.as_str(),
            &classify,
            pushed,
            response.accepted,
            started.elapsed(),
        );

        if !response.accepted {
            if response.exceptions.is_empty() {
                warn!(
                    code = response.code,
                    message = %response.message,
                    "Target rejected page without detail"
                );
                exceptions.push(rejected_page(response.code, &response.message, records));
            } else {
                warn!(
                    rejected = response.exceptions.len(),
                    "Target rejected records"
                );
                exceptions.extend(response.exceptions);
            }
        } else if !response.exceptions.is_empty() {
            exceptions.extend(response.exceptions);
        }

        debug!(pushed, exceptions = exceptions.len(), "Pushed page");

        Ok(PushOutcome {
            keys,
            exceptions,
            pushed,
        })
    }

    /// Prepare and submit in one step.
    pub async fn push_page(
        &self,
        ctx: &CallContext,
        data_type: DataType,
        page: Page,
    ) -> Result<PushOutcome> {
        let prepared = self.prepare(data_type, page);
        self.submit(ctx, prepared).await
    }
}

fn rejected_page(code: i64, message: &str, records: Vec<Value>) -> ExceptionResult {
    let code = if code == 0 { CODE_PUSH_REJECTED } else { code };
    let message = if message.is_empty() {
        "target rejected page".to_string()
    } else {
        message.to_string()
    };
    ExceptionResult::new(code, message, Value::Array(records), 0)
}

/// Build a page from loose records (handy for callers outside the fetch loop).
pub fn page_of(classify: &str, records: Vec<Record>) -> Page {
    Page {
        classify: classify.to_string(),
        total: records.len() as u64,
        records,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{
        BoxFuture, ClearStaleDataRequest, ClearStaleDataResponse, PushResponse, RemoteError,
    };
    use serde_json::json;
    use std::sync::Mutex;

    /// Target that records requests and answers with a canned response.
    struct ScriptedTarget {
        response: Option<PushResponse>,
        seen: Mutex<Vec<PushRequest>>,
    }

    impl ScriptedTarget {
        fn answering(response: PushResponse) -> Arc<Self> {
            Arc::new(Self {
                response: Some(response),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: None,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl TargetRef for ScriptedTarget {
        fn push(&self, request: PushRequest) -> BoxFuture<'_, PushResponse> {
            self.seen.lock().unwrap().push(request);
            let response = self.response.clone();
            Box::pin(async move { response.ok_or_else(|| RemoteError("down".into())) })
        }

        fn clear_stale_data(
            &self,
            _request: ClearStaleDataRequest,
        ) -> BoxFuture<'_, ClearStaleDataResponse> {
            Box::pin(async { Ok(ClearStaleDataResponse::default()) })
        }
    }

    fn records(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_prepare_extracts_keys() {
        let pusher = RecordPusher::new(ScriptedTarget::failing(), RunVersion(1), "f");
        let page = page_of("host", records(vec![json!({"bk_host_id": 1}), json!({"bk_host_id": "2"})]));
        let prepared = pusher.prepare(DataType::Instance, page);
        assert_eq!(prepared.keys, vec![1, 2]);
        assert!(prepared.exceptions.is_empty());
        assert_eq!(prepared.items[1].id, Some(2));
    }

    #[test]
    fn test_prepare_keeps_record_with_bad_key() {
        let pusher = RecordPusher::new(ScriptedTarget::failing(), RunVersion(1), "f");
        let page = page_of(
            "biz",
            records(vec![json!({"bk_biz_name": "no key"}), json!({"bk_biz_id": 7})]),
        );
        let prepared = pusher.prepare(DataType::Instance, page);
        assert_eq!(prepared.items.len(), 2);
        assert_eq!(prepared.items[0].id, None);
        assert_eq!(prepared.keys, vec![7]);
        assert_eq!(prepared.exceptions.len(), 1);
        assert_eq!(prepared.exceptions[0].code, CODE_FIELD_CONVERSION_FAILED);
        assert_eq!(prepared.exceptions[0].position, 0);
        assert_eq!(prepared.exceptions[0].data["bk_biz_name"], "no key");
    }

    #[tokio::test]
    async fn test_submit_tags_version_and_flag() {
        let target = ScriptedTarget::answering(PushResponse::accepted());
        let pusher = RecordPusher::new(target.clone(), RunVersion(42), "east");
        let page = page_of("attribute", records(vec![json!({"id": 3})]));

        let outcome = pusher
            .push_page(&CallContext::default(), DataType::Model, page)
            .await
            .unwrap();
        assert!(outcome.exceptions.is_empty());
        assert_eq!(outcome.pushed, 1);

        let seen = target.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].version, RunVersion(42));
        assert_eq!(seen[0].synchronize_flag, "east");
        assert_eq!(seen[0].data_type, DataType::Model);
        assert_eq!(seen[0].operate, PushOperation::Replace);
    }

    #[tokio::test]
    async fn test_empty_page_not_sent() {
        let target = ScriptedTarget::answering(PushResponse::accepted());
        let pusher = RecordPusher::new(target.clone(), RunVersion(1), "f");
        let outcome = pusher
            .push_page(&CallContext::default(), DataType::Instance, page_of("host", vec![]))
            .await
            .unwrap();
        assert_eq!(outcome.pushed, 0);
        assert!(target.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_without_detail_is_one_aggregate() {
        let target = ScriptedTarget::answering(PushResponse {
            accepted: false,
            code: 1_101_000,
            message: "db unavailable".to_string(),
            exceptions: vec![],
        });
        let pusher = RecordPusher::new(target, RunVersion(1), "f");
        let page = page_of("host", records(vec![json!({"bk_host_id": 1}), json!({"bk_host_id": 2})]));

        let outcome = pusher
            .push_page(&CallContext::default(), DataType::Instance, page)
            .await
            .unwrap();
        assert_eq!(outcome.pushed, 2);
        assert_eq!(outcome.exceptions.len(), 1);
        let aggregate = &outcome.exceptions[0];
        assert_eq!(aggregate.code, 1_101_000);
        assert_eq!(aggregate.position, 0);
        assert_eq!(aggregate.data.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_with_detail_is_verbatim() {
        let detail = vec![
            ExceptionResult::new(9, "dup", json!({"bk_host_id": 1}), 0),
            ExceptionResult::new(9, "dup", json!({"bk_host_id": 2}), 1),
        ];
        let target = ScriptedTarget::answering(PushResponse {
            accepted: false,
            exceptions: detail.clone(),
            ..Default::default()
        });
        let pusher = RecordPusher::new(target, RunVersion(1), "f");
        let page = page_of("host", records(vec![json!({"bk_host_id": 1}), json!({"bk_host_id": 2})]));

        let outcome = pusher
            .push_page(&CallContext::default(), DataType::Instance, page)
            .await
            .unwrap();
        assert_eq!(outcome.exceptions, detail);
    }

    #[test]
    fn test_rejected_page_without_message_uses_default_code() {
        let e = rejected_page(0, "", vec![json!({"id": 1})]);
        assert_eq!(e.code, CODE_PUSH_REJECTED);
        assert_eq!(e.message, "target rejected page");
    }

    #[tokio::test]
    async fn test_transport_failure_is_fatal() {
        let pusher = RecordPusher::new(ScriptedTarget::failing(), RunVersion(1), "f");
        let page = page_of("host", records(vec![json!({"bk_host_id": 1})]));
        let err = pusher
            .push_page(&CallContext::default(), DataType::Instance, page)
            .await
            .unwrap_err();
        assert!(err.is_phase_fatal());
    }
}
