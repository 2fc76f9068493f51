// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{DocumentProcessorTrait, ProcessingResult};
use crate::{
    matching::{
        address_parser::{build_match_candidate, normalise_address, AddressParser},
        csv_sink::{post_process_duplicate_uids, MatchCsvSink},
        matcher::AddressMatcher,
    },
    models::address_models::reference_address::UnmatchedAddress,
};
use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::info;

pub const NAME: &str = "address_match_processor";

fn field_as_string(document: &Document, key: &str) -> String {
    match document.get(key) {
        Some(Bson::String(s)) => s.trim().to_string(),
        Some(Bson::Int32(n)) => n.to_string(),
        Some(Bson::Int64(n)) => n.to_string(),
        Some(Bson::Double(n)) => {
            // UPRNs sometimes arrive as doubles; keep integral values clean.
            if n.fract() == 0.0 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        },
        _ => String::new(),
    }
}

pub struct AddressMatchProcessor {
    matcher: AddressMatcher,
    parser: Arc<dyn AddressParser>,
    sink: Mutex<MatchCsvSink>,
    found_path: PathBuf,
    not_found_path: PathBuf,
    fetch_batch_size: usize,
}

impl AddressMatchProcessor {
    pub async fn new(
        matcher: AddressMatcher,
        parser: Arc<dyn AddressParser>,
        data_dir: &Path,
        fetch_batch_size: usize,
    ) -> Result<Self> {
        matcher.ensure_indexes().await?;
        let found_path = data_dir.join("found_addresses.csv");
        let not_found_path = data_dir.join("not_found.csv");
        let sink = MatchCsvSink::open(&found_path, &not_found_path)?;
        Ok(Self {
            matcher,
            parser,
            sink: Mutex::new(sink),
            found_path,
            not_found_path,
            fetch_batch_size,
        })
    }
}

#[async_trait]
impl DocumentProcessorTrait for AddressMatchProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn document_filter(&self) -> Document {
        doc! {}
    }

    fn projection(&self) -> Option<Document> {
        Some(doc! { "uid": 1, "uprn": 1, "apd": 1, "pc": 1 })
    }

    fn fetch_batch_size(&self) -> usize {
        self.fetch_batch_size
    }

    fn progress_file_name(&self) -> &'static str {
        "matching_progress.txt"
    }

    async fn process_documents(&self, documents: Vec<Document>) -> Result<ProcessingResult> {
        let mut candidates = vec![];
        let mut parse_failures: Vec<UnmatchedAddress> = vec![];

        for document in &documents {
            let uid = field_as_string(document, "uid");
            let apd_original = field_as_string(document, "apd");
            let pc = field_as_string(document, "pc");
            let uprn = field_as_string(document, "uprn");

            match build_match_candidate(self.parser.as_ref(), &uid, &apd_original, &pc, &uprn) {
                Some(candidate) => candidates.push(candidate),
                // Parse failures are not-found, never an error.
                None => parse_failures.push(UnmatchedAddress {
                    uid,
                    apd: normalise_address(&apd_original),
                    apd_original,
                    pc,
                    uprn,
                }),
            }
        }

        let (found, mut not_found) = self.matcher.match_batch(candidates).await?;
        not_found.extend(parse_failures);

        let result = ProcessingResult {
            processed: documents.len() as u64,
            valid: found.len() as u64,
            invalid: not_found.len() as u64,
        };

        let mut sink = self.sink.lock().expect("CSV sink lock poisoned");
        for matched in &found {
            sink.write_found(matched)?;
        }
        for unmatched in &not_found {
            sink.write_not_found(unmatched)?;
        }
        sink.flush()?;

        Ok(result)
    }

    async fn on_completion(&self) -> Result<()> {
        self.sink.lock().expect("CSV sink lock poisoned").flush()?;
        let stats = post_process_duplicate_uids(&self.found_path, &self.not_found_path)?;
        info!(
            moved = stats.moved,
            remaining_not_found = stats.remaining_not_found,
            "[Matcher] Duplicate-uid absorption complete"
        );
        Ok(())
    }
}
