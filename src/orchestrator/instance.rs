// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Instance phase.
//!
//! Business rows go first so their keys can scope `set`, `module`, `process`
//! and the association phase. The remaining object types follow in sorted
//! order.

use super::{Phase, SyncOrchestrator};
use crate::error::Result;
use crate::fetch::InstanceStrategy;
use crate::model::{DataType, OBJ_BUSINESS};
use tracing::{debug, info, instrument};

impl SyncOrchestrator {
    /// Replicate every in-scope object type's instances.
    pub async fn run_instance_phase(&mut self) -> Result<()> {
        self.pretreatment();
        self.report.record(Phase::Instance, Vec::new());

        if self.discovered.object_ids.contains(OBJ_BUSINESS) {
            self.sync_instances(OBJ_BUSINESS).await?;
        }
        info!(businesses = self.discovered.business_ids.len(), "Business IDs discovered");

        let remaining: Vec<String> = self
            .discovered
            .object_ids
            .iter()
            .filter(|obj| obj.as_str() != OBJ_BUSINESS)
            .cloned()
            .collect();

        for obj in remaining {
            if InstanceStrategy::for_object(&obj) == InstanceStrategy::NotSynchronized {
                debug!(object = %obj, "Object type is not synchronized, skipping");
                continue;
            }
            self.sync_instances(&obj).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(phase = "instance"))]
    async fn sync_instances(&mut self, obj: &str) -> Result<()> {
        let limit = self.page_size;
        let mut start = 0;
        loop {
            let page = self
                .instances
                .fetch(&self.ctx, obj, &self.discovered.business_ids, start, limit)
                .await?;
            self.note_fetch(&page);
            let next = page.next_start(limit);

            let keys = self.push_page(Phase::Instance, DataType::Instance, page).await?;
            if obj == OBJ_BUSINESS {
                self.discovered.record_business_ids(keys);
            }

            match next {
                Some(n) => start = n,
                None => return Ok(()),
            }
        }
    }
}
