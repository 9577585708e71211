// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Instance rows.
//!
//! Each object type maps to an [`InstanceStrategy`] that decides how its
//! reads are scoped:
//!
//! | Strategy | Object types | Filter |
//! |----------|--------------|--------|
//! | `Business` | `biz` | resource pool excluded, business-name in/not-in |
//! | `BusinessScoped` | `set`, `module`, `process` | `bk_biz_id` in discovered IDs |
//! | `Global` | `host`, `plat`, custom objects | none |
//! | `NotSynchronized` | `config_template`, `template_version` | never read |
//!
//! With the instance filter enabled every read also requires
//! `bk_synchronize_sign` in `[flag, "*"]`.

use super::{read_page, Page};
use crate::config::SyncTaskConfig;
use crate::error::Result;
use crate::filter::Filter;
use crate::model::{
    DataType, FIELD_BIZ_DEFAULT, FIELD_BIZ_ID, FIELD_BIZ_NAME, FIELD_SYNCHRONIZE_SIGN,
    OBJ_BUSINESS, OBJ_CONFIG_TEMPLATE, OBJ_MODULE, OBJ_PROCESS, OBJ_SET, OBJ_TEMPLATE_VERSION,
    RESOURCE_POOL_DEFAULT, SYNCHRONIZE_SIGN_ALL,
};
use crate::remote::{CallContext, SourceRef};
use std::collections::BTreeSet;
use std::sync::Arc;

/// How reads for one object type are scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStrategy {
    /// The business rows themselves.
    Business,
    /// Rows that belong to a business.
    BusinessScoped,
    /// Rows that exist outside any business.
    Global,
    /// Never replicated.
    NotSynchronized,
}

impl InstanceStrategy {
    pub fn for_object(obj_id: &str) -> Self {
        match obj_id {
            OBJ_BUSINESS => Self::Business,
            OBJ_SET | OBJ_MODULE | OBJ_PROCESS => Self::BusinessScoped,
            OBJ_CONFIG_TEMPLATE | OBJ_TEMPLATE_VERSION => Self::NotSynchronized,
            _ => Self::Global,
        }
    }
}

/// Reads instance pages under one task's filters.
pub struct InstanceFetcher {
    source: Arc<dyn SourceRef>,
    whitelist: bool,
    business_names: BTreeSet<String>,
    sync_resource_pool: bool,
    supplier_accounts: Vec<String>,
    /// `Some(flag)` when the instance filter is enabled.
    instance_filter: Option<String>,
}

impl InstanceFetcher {
    pub fn new(source: Arc<dyn SourceRef>, task: &SyncTaskConfig) -> Self {
        Self {
            source,
            whitelist: task.whitelist,
            business_names: task.business_names.clone(),
            sync_resource_pool: task.sync_resource_pool,
            supplier_accounts: task.supplier_accounts.iter().cloned().collect(),
            instance_filter: task
                .enable_instance_filter
                .then(|| task.synchronize_flag.clone()),
        }
    }

    /// Build the read filter for `obj_id`, or `None` if it is never read.
    pub fn filter_for(&self, obj_id: &str, business_ids: &BTreeSet<i64>) -> Option<Filter> {
        let mut filter = match InstanceStrategy::for_object(obj_id) {
            InstanceStrategy::NotSynchronized => return None,
            InstanceStrategy::Business => self.business_filter(),
            InstanceStrategy::BusinessScoped => {
                Filter::new().field_in(FIELD_BIZ_ID, business_ids.iter().copied())
            }
            InstanceStrategy::Global => Filter::new(),
        };

        if let Some(flag) = &self.instance_filter {
            filter = filter.field_in(
                FIELD_SYNCHRONIZE_SIGN,
                [flag.as_str(), SYNCHRONIZE_SIGN_ALL],
            );
        }
        Some(filter)
    }

    fn business_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if !self.sync_resource_pool {
            filter = filter.field_ne(FIELD_BIZ_DEFAULT, RESOURCE_POOL_DEFAULT);
        }
        if !self.business_names.is_empty() {
            let names = self.business_names.iter().map(String::as_str);
            filter = if self.whitelist {
                filter.field_in(FIELD_BIZ_NAME, names)
            } else {
                filter.field_not_in(FIELD_BIZ_NAME, names)
            };
        }
        filter
    }

    /// Read one page of `obj_id` instances.
    ///
    /// Not-synchronized types return an empty page without a remote call.
    pub async fn fetch(
        &self,
        ctx: &CallContext,
        obj_id: &str,
        business_ids: &BTreeSet<i64>,
        start: u64,
        limit: u64,
    ) -> Result<Page> {
        let Some(filter) = self.filter_for(obj_id, business_ids) else {
            return Ok(Page::empty(obj_id));
        };
        read_page(
            self.source.as_ref(),
            ctx,
            DataType::Instance,
            obj_id,
            &filter,
            &self.supplier_accounts,
            start,
            limit,
        )
        .await
    }
}
