// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, IntCounterVec, IntGaugeVec,
};

/// Number of times a given processor has been invoked on a batch.
pub static PROCESSOR_INVOCATIONS_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lease_processor_invocation_count",
        "Number of times a given processor has been invoked",
        &["processor_name"]
    )
    .unwrap()
});

/// Number of times a given processor has completed a batch successfully.
pub static PROCESSOR_SUCCESSES_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lease_processor_success_count",
        "Number of times a given processor has completed a batch successfully",
        &["processor_name"]
    )
    .unwrap()
});

/// Number of times a given processor has raised an error.
pub static PROCESSOR_ERRORS_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lease_processor_errors",
        "Number of times a given processor has raised an error",
        &["processor_name"]
    )
    .unwrap()
});

/// Documents processed, labelled by extraction outcome.
pub static DOCUMENTS_PROCESSED_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lease_processor_documents_processed",
        "Documents processed, by processor and outcome",
        &["processor_name", "outcome"]
    )
    .unwrap()
});

/// Documents in the most recent flushed batch.
pub static LATEST_BATCH_SIZE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "lease_processor_latest_batch_size",
        "Documents in the most recent flushed batch",
        &["processor_name"]
    )
    .unwrap()
});

/// Postcode geocode lookups, by result (hit, miss, negative, error).
pub static POSTCODE_LOOKUP_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lease_enricher_postcode_lookups",
        "Postcode geocode lookups by result",
        &["result"]
    )
    .unwrap()
});
