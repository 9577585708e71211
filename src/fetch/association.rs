// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relation rows. Only host-to-module placement is replicated.

use super::{read_page, Page};
use crate::config::SyncTaskConfig;
use crate::error::Result;
use crate::filter::Filter;
use crate::model::{DataType, ASSOCIATION_MODULE_HOST, FIELD_BIZ_ID};
use crate::remote::{CallContext, SourceRef};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Relation types the engine knows how to scope.
pub const SUPPORTED_ASSOCIATIONS: [&str; 1] = [ASSOCIATION_MODULE_HOST];

/// Reads association pages scoped to the discovered businesses.
pub struct AssociationFetcher {
    source: Arc<dyn SourceRef>,
    supplier_accounts: Vec<String>,
}

impl AssociationFetcher {
    pub fn new(source: Arc<dyn SourceRef>, task: &SyncTaskConfig) -> Self {
        Self {
            source,
            supplier_accounts: task.supplier_accounts.iter().cloned().collect(),
        }
    }

    /// Filter for `classify`, or `None` for an unsupported relation type.
    pub fn filter_for(classify: &str, business_ids: &BTreeSet<i64>) -> Option<Filter> {
        match classify {
            ASSOCIATION_MODULE_HOST => {
                Some(Filter::new().field_in(FIELD_BIZ_ID, business_ids.iter().copied()))
            }
            _ => None,
        }
    }

    /// Read one page; unsupported relation types yield an empty page.
    pub async fn fetch(
        &self,
        ctx: &CallContext,
        classify: &str,
        business_ids: &BTreeSet<i64>,
        start: u64,
        limit: u64,
    ) -> Result<Page> {
        let Some(filter) = Self::filter_for(classify, business_ids) else {
            tracing::debug!(classify = %classify, "Unsupported association type, skipping");
            return Ok(Page::empty(classify));
        };
        read_page(
            self.source.as_ref(),
            ctx,
            DataType::Association,
            classify,
            &filter,
            &self.supplier_accounts,
            start,
            limit,
        )
        .await
    }
}
