// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Model rows: base models, attributes, attribute groups and classifications.

use super::{read_page, Page};
use crate::config::SyncTaskConfig;
use crate::error::Result;
use crate::filter::Filter;
use crate::model::{DataType, FIELD_CLASSIFICATION_ID, FIELD_OBJ_ID};
use crate::remote::{CallContext, SourceRef};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Reads model pages with a caller-supplied filter.
pub struct ModelFetcher {
    source: Arc<dyn SourceRef>,
    supplier_accounts: Vec<String>,
}

impl ModelFetcher {
    pub fn new(source: Arc<dyn SourceRef>, task: &SyncTaskConfig) -> Self {
        Self {
            source,
            supplier_accounts: task.supplier_accounts.iter().cloned().collect(),
        }
    }

    /// `bk_obj_id` in (whitelist) or not-in (blacklist) the task's object IDs.
    ///
    /// Empty when the task lists no object IDs.
    pub fn object_filter(task: &SyncTaskConfig) -> Filter {
        if task.object_ids.is_empty() {
            return Filter::new();
        }
        let ids = task.object_ids.iter().map(String::as_str);
        if task.whitelist {
            Filter::new().field_in(FIELD_OBJ_ID, ids)
        } else {
            Filter::new().field_not_in(FIELD_OBJ_ID, ids)
        }
    }

    /// `bk_classification_id` in the discovered classifications.
    pub fn classification_filter(classification_ids: &BTreeSet<String>) -> Filter {
        Filter::new().field_in(
            FIELD_CLASSIFICATION_ID,
            classification_ids.iter().map(String::as_str),
        )
    }

    pub async fn fetch(
        &self,
        ctx: &CallContext,
        classify: &str,
        filter: &Filter,
        start: u64,
        limit: u64,
    ) -> Result<Page> {
        read_page(
            self.source.as_ref(),
            ctx,
            DataType::Model,
            classify,
            filter,
            &self.supplier_accounts,
            start,
            limit,
        )
        .await
    }
}
