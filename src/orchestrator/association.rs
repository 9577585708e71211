// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Association phase.

use super::{Phase, SyncOrchestrator};
use crate::error::Result;
use crate::fetch::association::SUPPORTED_ASSOCIATIONS;
use crate::model::DataType;
use tracing::instrument;

impl SyncOrchestrator {
    /// Replicate relation rows scoped to the businesses found this run.
    pub async fn run_association_phase(&mut self) -> Result<()> {
        self.report.record(Phase::Association, Vec::new());
        for classify in SUPPORTED_ASSOCIATIONS {
            self.sync_associations(classify).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(phase = "association"))]
    async fn sync_associations(&mut self, classify: &str) -> Result<()> {
        let limit = self.page_size;
        let mut start = 0;
        loop {
            let page = self
                .associations
                .fetch(&self.ctx, classify, &self.discovered.business_ids, start, limit)
                .await?;
            self.note_fetch(&page);
            let next = page.next_start(limit);

            self.push_page(Phase::Association, DataType::Association, page)
                .await?;

            match next {
                Some(n) => start = n,
                None => return Ok(()),
            }
        }
    }
}
