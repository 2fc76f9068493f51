// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{DocumentProcessorTrait, ProcessingResult};
use crate::{
    extraction::neural::{NeuralExtractor, NeuralInput, NeuralOutcome},
    processors::regex_term_processor::bson_date,
};
use anyhow::Result;
use async_trait::async_trait;
use mongodb::{
    bson::{doc, Document},
    options::{UpdateOneModel, WriteModel},
    Client, Namespace,
};
use tracing::warn;

pub const NAME: &str = "neural_term_processor";

/// Update fields for one neural outcome.
pub fn outcome_update_fields(outcome: &NeuralOutcome) -> Document {
    match outcome {
        NeuralOutcome::Valid(fields) => {
            let mut update = doc! { "t5_is_valid": true };
            if let Some(start) = fields.start_date {
                update.insert("t5_start_date", bson_date(start));
            }
            if let Some(expiry) = fields.expiry_date {
                update.insert("t5_expiry_date", bson_date(expiry));
            }
            if let Some(tenure) = fields.tenure_years {
                update.insert("t5_tenure_years", tenure);
            }
            update
        },
        NeuralOutcome::Invalid { error } => doc! {
            "t5_is_valid": false,
            "t5_parse_error": error,
        },
    }
}

pub struct NeuralTermProcessor {
    client: Client,
    namespace: Namespace,
    extractor: NeuralExtractor,
    neural_batch_size: usize,
    db_write_batch_size: usize,
}

impl NeuralTermProcessor {
    pub fn new(
        client: Client,
        namespace: Namespace,
        extractor: NeuralExtractor,
        neural_batch_size: usize,
        db_write_batch_size: usize,
    ) -> Self {
        Self {
            client,
            namespace,
            extractor,
            neural_batch_size,
            db_write_batch_size,
        }
    }

    async fn flush(&self, operations: Vec<WriteModel>) {
        if operations.is_empty() {
            return;
        }
        if let Err(e) = self.client.bulk_write(operations).ordered(false).await {
            warn!(
                processor_name = NAME,
                error = ?e,
                "[Extractor] Bulk write error (some operations may have succeeded)"
            );
        }
    }
}

#[async_trait]
impl DocumentProcessorTrait for NeuralTermProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn document_filter(&self) -> Document {
        // Regex failures only, and not yet seen by this phase.
        doc! {
            "regex_is_valid": false,
            "term": { "$exists": true, "$ne": "" },
            "t5_is_valid": { "$exists": false },
        }
    }

    fn fetch_batch_size(&self) -> usize {
        // Keep the inference pipeline fed a few model batches ahead.
        self.neural_batch_size * 4
    }

    fn progress_file_name(&self) -> &'static str {
        "t5_extraction_progress.txt"
    }

    async fn process_documents(&self, documents: Vec<Document>) -> Result<ProcessingResult> {
        let mut result = ProcessingResult::default();
        let mut operations: Vec<WriteModel> = vec![];

        for chunk in documents.chunks(self.neural_batch_size) {
            let mut ids = vec![];
            let mut inputs = vec![];
            for document in chunk {
                let id = match document.get("_id") {
                    Some(id) => id.clone(),
                    None => continue,
                };
                ids.push(id);
                inputs.push(NeuralInput {
                    term: document.get_str("term").unwrap_or_default().to_string(),
                    dol: document.get_str("dol").ok().map(str::to_string),
                });
            }

            let outcomes = self.extractor.extract_batch(&inputs).await;
            for (id, outcome) in ids.into_iter().zip(&outcomes) {
                if matches!(outcome, NeuralOutcome::Valid(_)) {
                    result.valid += 1;
                } else {
                    result.invalid += 1;
                }
                result.processed += 1;
                operations.push(WriteModel::UpdateOne(
                    UpdateOneModel::builder()
                        .namespace(self.namespace.clone())
                        .filter(doc! { "_id": id })
                        .update(doc! { "$set": outcome_update_fields(outcome) })
                        .build(),
                ));
            }

            if operations.len() >= self.db_write_batch_size {
                self.flush(std::mem::take(&mut operations)).await;
            }
        }
        self.flush(operations).await;
        Ok(result)
    }
}
