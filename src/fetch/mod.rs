// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fetchers: turn {entity type, pagination window, task filters} into one
//! source read.
//!
//! # Pagination
//!
//! Count-then-offset. Every read returns the rows of one window plus the
//! total the source holds for the query; the caller advances `start` by
//! `limit` and stops once `start >= total`:
//!
//! ```text
//! total = 250, limit = 100
//!
//!   read(start=0)   ──▶ 100 rows, total 250 ──▶ start = 100
//!   read(start=100) ──▶ 100 rows, total 250 ──▶ start = 200
//!   read(start=200) ──▶  50 rows, total 250 ──▶ start = 300 ≥ 250, stop
//! ```
//!
//! A total of zero still costs the one read that reports it.

pub mod association;
pub mod instance;
pub mod model;

pub use association::AssociationFetcher;
pub use instance::{InstanceFetcher, InstanceStrategy};
pub use model::ModelFetcher;

use crate::error::Result;
use crate::filter::Filter;
use crate::model::{DataType, Record};
use crate::remote::{CallContext, ReadRequest, SourceRef};
use std::time::Instant;
use tracing::debug;

/// One window of rows from the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub data_type: Option<DataType>,
    pub classify: String,
    pub records: Vec<Record>,
    /// Rows the source holds for the whole query.
    pub total: u64,
    /// Offset this page was read at.
    pub start: u64,
}

impl Page {
    /// A page for a classification that is never read.
    pub fn empty(classify: &str) -> Self {
        Self {
            classify: classify.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Offset of the following page, or `None` when this was the last one.
    pub fn next_start(&self, limit: u64) -> Option<u64> {
        next_start(self.start, limit, self.total)
    }
}

/// `start + limit` if that is still below `total`.
///
/// A zero `limit` never advances.
pub fn next_start(start: u64, limit: u64, total: u64) -> Option<u64> {
    if limit == 0 {
        return None;
    }
    let next = start.saturating_add(limit);
    (next < total).then_some(next)
}

/// Number of reads a full pass makes for `total` rows at `limit` per page.
pub fn expected_reads(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 1;
    }
    total.div_ceil(limit).max(1)
}

/// Shared read path for all fetchers.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn read_page(
    source: &dyn SourceRef,
    ctx: &CallContext,
    data_type: DataType,
    classify: &str,
    filter: &Filter,
    supplier_accounts: &[String],
    start: u64,
    limit: u64,
) -> Result<Page> {
    let request = ReadRequest {
        data_type,
        classify: classify.to_string(),
        condition: filter.to_condition_map(),
        supplier_accounts: supplier_accounts.to_vec(),
        start,
        limit,
    };

    let started = Instant::now();
    let response = ctx.call("read", source.read(request)).await?;
    crate::metrics::record_fetch(
        data_type.as_str(),
        classify,
        response.info.len(),
        started.elapsed(),
    );

    debug!(
        data_type = %data_type,
        classify = %classify,
        start,
        limit,
        rows = response.info.len(),
        total = response.count,
        "Fetched page"
    );

    Ok(Page {
        data_type: Some(data_type),
        classify: classify.to_string(),
        records: response.info,
        total: response.count,
        start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_start_walks_250_by_100() {
        assert_eq!(next_start(0, 100, 250), Some(100));
        assert_eq!(next_start(100, 100, 250), Some(200));
        assert_eq!(next_start(200, 100, 250), None);
    }

    #[test]
    fn test_next_start_exact_multiple() {
        assert_eq!(next_start(0, 100, 200), Some(100));
        assert_eq!(next_start(100, 100, 200), None);
    }

    #[test]
    fn test_next_start_zero_total_and_zero_limit() {
        assert_eq!(next_start(0, 100, 0), None);
        assert_eq!(next_start(0, 0, 100), None);
    }

    #[test]
    fn test_expected_reads() {
        assert_eq!(expected_reads(0, 100), 1);
        assert_eq!(expected_reads(1, 100), 1);
        assert_eq!(expected_reads(100, 100), 1);
        assert_eq!(expected_reads(101, 100), 2);
        assert_eq!(expected_reads(250, 100), 3);
    }

    #[test]
    fn test_page_helpers() {
        let page = Page::empty("config_template");
        assert!(page.is_empty());
        assert_eq!(page.len(), 0);
        assert_eq!(page.next_start(100), None);
    }
}
