// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The resumable streaming driver.
//!
//! Pulls documents in `_id` order in fixed-size pages, hands each page to a
//! processor, and checkpoints the last uid of every completed page to a
//! progress file. A restart resumes from the document after the token; a
//! token whose uid can no longer be located restarts from the beginning.
//! The loop is single-threaded with one in-flight call at a time, so resume
//! semantics are deterministic. Ctrl-c finishes the in-flight page (its
//! writes included), persists the token, and exits cleanly.

use crate::{
    processors::{DocumentProcessorTrait, ProcessingResult},
    utils::{
        counters::{
            DOCUMENTS_PROCESSED_COUNT, LATEST_BATCH_SIZE, PROCESSOR_ERRORS_COUNT,
            PROCESSOR_INVOCATIONS_COUNT, PROCESSOR_SUCCESSES_COUNT,
        },
        progress_file,
    },
};
use anyhow::{Context, Result};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    Client, Collection, Namespace,
};
use moving_average::MovingAverage;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{error, info, warn};

pub struct Worker {
    collection: Collection<Document>,
    data_dir: PathBuf,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(client: &Client, namespace: &Namespace, data_dir: PathBuf) -> Self {
        let collection = client.database(&namespace.db).collection(&namespace.coll);
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("[Driver] Interrupt received, finishing in-flight batch");
                flag.store(true, Ordering::SeqCst);
            }
        });
        Self {
            collection,
            data_dir,
            shutdown,
        }
    }

    /// Locate the `_id` to resume after, from the progress token. A token
    /// whose document no longer exists restarts from the beginning.
    async fn resume_position(&self, progress_path: &PathBuf) -> Result<Option<Bson>> {
        let last_uid = match progress_file::read_last_processed_uid(progress_path)? {
            Some(uid) => uid,
            None => return Ok(None),
        };
        info!(uid = last_uid.as_str(), "[Driver] Resuming from progress token");
        let last_doc = self
            .collection
            .find_one(doc! { "uid": &last_uid })
            .await
            .context("Failed to look up the progress token document")?;
        match last_doc.and_then(|d| d.get("_id").cloned()) {
            Some(id) => Ok(Some(id)),
            None => {
                warn!(
                    uid = last_uid.as_str(),
                    "[Driver] Progress token document not found, restarting from the beginning"
                );
                Ok(None)
            },
        }
    }

    async fn fetch_page(
        &self,
        processor: &dyn DocumentProcessorTrait,
        resume_id: &Option<Bson>,
    ) -> Result<Vec<Document>> {
        let mut filter = processor.document_filter();
        if let Some(id) = resume_id {
            filter.insert("_id", doc! { "$gt": id.clone() });
        }
        let mut find = self
            .collection
            .find(filter)
            .sort(doc! { "_id": 1 })
            .limit(processor.fetch_batch_size() as i64);
        if let Some(projection) = processor.projection() {
            find = find.projection(projection);
        }
        let cursor = find.await.context("Document fetch failed")?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents)
    }

    /// Drive one processor over the document stream to completion (or
    /// interrupt).
    pub async fn run(&self, processor: Arc<dyn DocumentProcessorTrait>) -> Result<()> {
        let processor_name = processor.name();
        let progress_path = self.data_dir.join(processor.progress_file_name());
        info!(processor_name = processor_name, "[Driver] Starting stream");

        let mut resume_id = self.resume_position(&progress_path).await?;
        let mut totals = ProcessingResult::default();
        let mut ma = MovingAverage::new(10_000);
        let mut interrupted = false;

        loop {
            let documents = self.fetch_page(processor.as_ref(), &resume_id).await?;
            if documents.is_empty() {
                break;
            }
            let page_size = documents.len();
            let last_id = documents.last().and_then(|d| d.get("_id").cloned());
            let last_uid = documents
                .last()
                .and_then(|d| d.get_str("uid").ok())
                .map(str::to_string);

            PROCESSOR_INVOCATIONS_COUNT
                .with_label_values(&[processor_name])
                .inc();
            let result = match processor.process_documents(documents).await {
                Ok(result) => {
                    PROCESSOR_SUCCESSES_COUNT
                        .with_label_values(&[processor_name])
                        .inc();
                    result
                },
                Err(e) => {
                    PROCESSOR_ERRORS_COUNT
                        .with_label_values(&[processor_name])
                        .inc();
                    error!(
                        processor_name = processor_name,
                        error = ?e,
                        "[Driver] Error processing batch; progress token not advanced"
                    );
                    return Err(e);
                },
            };
            totals.add(result);
            DOCUMENTS_PROCESSED_COUNT
                .with_label_values(&[processor_name, "valid"])
                .inc_by(result.valid);
            DOCUMENTS_PROCESSED_COUNT
                .with_label_values(&[processor_name, "invalid"])
                .inc_by(result.invalid);
            LATEST_BATCH_SIZE
                .with_label_values(&[processor_name])
                .set(page_size as i64);

            // The batch's writes are flushed; only now move the token.
            if let Some(uid) = &last_uid {
                progress_file::save_progress(&progress_path, uid)?;
            }
            resume_id = last_id;

            ma.tick_now(page_size as u64);
            info!(
                processor_name = processor_name,
                processed = totals.processed,
                valid = totals.valid,
                invalid = totals.invalid,
                docs_per_second = ma.avg() as u64,
                "[Driver] Processed batch"
            );

            if self.shutdown.load(Ordering::SeqCst) {
                interrupted = true;
                break;
            }
        }

        if interrupted {
            info!(
                processor_name = processor_name,
                processed = totals.processed,
                "[Driver] Interrupted; progress token persisted for resume"
            );
            return Ok(());
        }

        processor.on_completion().await?;
        progress_file::clear_progress(&progress_path)?;

        let valid_pct = if totals.processed > 0 {
            100.0 * totals.valid as f64 / totals.processed as f64
        } else {
            0.0
        };
        info!(
            processor_name = processor_name,
            processed = totals.processed,
            valid = totals.valid,
            invalid = totals.invalid,
            valid_pct = format!("{valid_pct:.1}").as_str(),
            "[Driver] Stream complete"
        );
        Ok(())
    }
}
