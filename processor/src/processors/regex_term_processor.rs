// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{DocumentProcessorTrait, ProcessingResult};
use crate::{
    extraction::{patterns::parse_lease_term, validator::validate_term},
    models::lease_models::lease_term::LeaseTerm,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use mongodb::{
    bson::{doc, Bson, Document},
    options::{UpdateOneModel, WriteModel},
    Client, Namespace,
};
use tracing::warn;

pub const NAME: &str = "regex_term_processor";

pub fn bson_date(date: NaiveDate) -> Bson {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
    Bson::DateTime(mongodb::bson::DateTime::from_chrono(midnight))
}

fn valid_update(lease: &LeaseTerm) -> Document {
    doc! {
        "regex_is_valid": true,
        "start_date": bson_date(lease.start_date),
        "expiry_date": bson_date(lease.expiry_date),
        "tenure_years": lease.tenure_years,
    }
}

fn invalid_update(error: &str) -> Document {
    doc! {
        "regex_is_valid": false,
        "regex_parse_error": error,
    }
}

/// Extraction fields written back for one document: either the parsed term
/// or a failure marker that keeps the record eligible for the neural phase.
pub fn extract_update_fields(document: &Document) -> Document {
    let term = document.get_str("term").ok().filter(|t| !t.is_empty());
    let term = match term {
        Some(term) => term,
        None => return invalid_update("No term field found"),
    };

    let dol = document.get_str("dol").ok();
    match parse_lease_term(term, dol) {
        None => invalid_update("Failed to parse term"),
        Some(lease) => {
            if validate_term(&lease, None).is_valid() {
                valid_update(&lease)
            } else {
                invalid_update("Validation failed")
            }
        },
    }
}

pub struct RegexTermProcessor {
    client: Client,
    namespace: Namespace,
    write_batch_size: usize,
}

impl RegexTermProcessor {
    pub fn new(client: Client, namespace: Namespace, write_batch_size: usize) -> Self {
        Self {
            client,
            namespace,
            write_batch_size,
        }
    }

    async fn flush(&self, operations: Vec<WriteModel>) {
        if operations.is_empty() {
            return;
        }
        // Unordered: per-document sets are independent and idempotent, so a
        // partial failure is logged and the batch advances.
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
impl DocumentProcessorTrait for RegexTermProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn document_filter(&self) -> Document {
        // Skip documents either extractor already settled; empty terms are
        // marked without parsing.
        doc! {
            "regex_is_valid": { "$ne": true },
            "t5_is_valid": { "$ne": true },
            "term": { "$exists": true, "$ne": "" },
        }
    }

    fn fetch_batch_size(&self) -> usize {
        self.write_batch_size
    }

    fn progress_file_name(&self) -> &'static str {
        "regex_extraction_progress.txt"
    }

    async fn process_documents(&self, documents: Vec<Document>) -> Result<ProcessingResult> {
        let mut result = ProcessingResult::default();
        let mut operations: Vec<WriteModel> = Vec::with_capacity(documents.len());
        for document in &documents {
            let id = match document.get("_id") {
                Some(id) => id.clone(),
                None => continue,
            };
            let update = extract_update_fields(document);
            if update.get_bool("regex_is_valid").unwrap_or(false) {
                result.valid += 1;
            } else {
                result.invalid += 1;
            }
            result.processed += 1;
            operations.push(WriteModel::UpdateOne(
                UpdateOneModel::builder()
                    .namespace(self.namespace.clone())
                    .filter(doc! { "_id": id })
                    .update(doc! { "$set": update })
                    .build(),
            ));
            if operations.len() >= self.write_batch_size {
                self.flush(std::mem::take(&mut operations)).await;
            }
        }
        self.flush(operations).await;
        Ok(result)
    }
}
