// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Model phase: base models, attributes, attribute groups, then the
//! classifications those rows referenced.

use super::{Phase, SyncOrchestrator};
use crate::error::Result;
use crate::fetch::ModelFetcher;
use crate::filter::Filter;
use crate::model::{
    DataType, MODEL_ATTRIBUTE, MODEL_ATTRIBUTE_GROUP, MODEL_BASE, MODEL_CLASSIFICATION,
};
use tracing::{debug, info, instrument};

const OBJECT_SCOPED_MODELS: [&str; 3] = [MODEL_BASE, MODEL_ATTRIBUTE, MODEL_ATTRIBUTE_GROUP];

impl SyncOrchestrator {
    /// Replicate model metadata.
    ///
    /// With `ignore_model_attributes` rows are still read, so discovery and
    /// key checks still happen, but nothing is written.
    pub async fn run_model_phase(&mut self) -> Result<()> {
        self.pretreatment();
        self.report.record(Phase::Model, Vec::new());

        let object_filter = ModelFetcher::object_filter(&self.task);
        for classify in OBJECT_SCOPED_MODELS {
            self.sync_models(classify, &object_filter).await?;
        }

        if self.discovered.classification_ids.is_empty() {
            debug!("No classifications referenced, skipping classification rows");
            return Ok(());
        }
        let filter = ModelFetcher::classification_filter(&self.discovered.classification_ids);
        self.sync_models(MODEL_CLASSIFICATION, &filter).await?;

        info!(
            objects = self.discovered.object_ids.len(),
            classifications = self.discovered.classification_ids.len(),
            "Model metadata replicated"
        );
        Ok(())
    }

    #[instrument(skip(self, filter), fields(phase = "model"))]
    async fn sync_models(&mut self, classify: &str, filter: &Filter) -> Result<()> {
        let limit = self.page_size;
        let mut start = 0;
        loop {
            let page = self.models.fetch(&self.ctx, classify, filter, start, limit).await?;
            self.note_fetch(&page);
            let next = page.next_start(limit);

            for row in &page.records {
                self.discovered.record_model_row(row);
            }

            if self.task.ignore_model_attributes {
                let prepared = self.pusher.prepare(DataType::Model, page);
                self.report.record(Phase::Model, prepared.exceptions);
            } else {
                self.push_page(Phase::Model, DataType::Model, page).await?;
            }

            match next {
                Some(n) => start = n,
                None => return Ok(()),
            }
        }
    }
}
