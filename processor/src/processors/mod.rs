// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

pub mod address_match_processor;
pub mod neural_term_processor;
pub mod regex_term_processor;

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::Document;

/// Per-batch outcome counts reported back to the driver.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProcessingResult {
    pub processed: u64,
    pub valid: u64,
    pub invalid: u64,
}

impl ProcessingResult {
    pub fn add(&mut self, other: ProcessingResult) {
        self.processed += other.processed;
        self.valid += other.valid;
        self.invalid += other.invalid;
    }
}

/// A processor the streaming driver can run over the document store. The
/// driver owns paging, ordering, checkpointing and cancellation; the
/// processor owns what happens to each page (including its own writes).
#[async_trait]
pub trait DocumentProcessorTrait: Send + Sync {
    fn name(&self) -> &'static str;

    /// Which documents this processor still has to handle. Combined by the
    /// driver with the resume position.
    fn document_filter(&self) -> Document;

    /// Optional projection to keep fetches lean.
    fn projection(&self) -> Option<Document> {
        None
    }

    /// Page size for the `_id`-ordered fetch.
    fn fetch_batch_size(&self) -> usize;

    /// Name of this processor's progress-token file.
    fn progress_file_name(&self) -> &'static str;

    /// Handle one page of documents, in `_id` order.
    async fn process_documents(&self, documents: Vec<Document>) -> Result<ProcessingResult>;

    /// Invoked once after the stream is exhausted.
    async fn on_completion(&self) -> Result<()> {
        Ok(())
    }
}
