// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Neural fallback extraction for terms the pattern cascade cannot handle.
//!
//! The fine-tuned seq2seq model is an external artifact reached through the
//! [`Seq2SeqGenerator`] trait. Its output contract: the generated string
//! concatenates start date, expiry date and tenure with no separator, each
//! possibly the literal "Not specified". Dates come back as DD/MM/YYYY; the
//! tenure as "N years". Parsing reuses the same calendar primitives as the
//! regex engine so both extractors share date semantics.

use crate::{
    extraction::{
        primitives::{
            add_fractional_years, add_years_clamped, full_months_between, full_years_between,
            parse_dol_date, QUARTER_DAYS,
        },
        validator::{is_lease_term_valid, DEFAULT_TOLERANCE_DAYS},
    },
    models::lease_models::lease_term::ExtractedFields,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{sync::Arc, time::Duration};

/// Input prompt prefix the model was fine-tuned with.
pub const PROMPT_PREFIX: &str = "parse lease: ";
/// Maximum tokens per sequence, matching the training configuration.
pub const MAX_LENGTH: usize = 64;
/// Beam width used at generation time.
pub const NUM_BEAMS: usize = 4;

/// The external sequence-to-sequence model. One generation call per batch of
/// prompts; outputs come back in input order.
#[async_trait]
pub trait Seq2SeqGenerator: Send + Sync {
    async fn generate_batch(&self, inputs: &[String]) -> Result<Vec<String>>;
}

/// A generator backed by an inference server speaking a minimal JSON
/// protocol: POST {"inputs": [...], "max_length": .., "num_beams": ..,
/// "early_stopping": true} returning {"outputs": [...]}.
pub struct HttpSeq2SeqGenerator {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpSeq2SeqGenerator {
    /// Connect to the first reachable endpoint from the candidate list.
    pub async fn connect(endpoints: &[String], auth_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        for endpoint in endpoints {
            match client.get(endpoint).send().await {
                Ok(_) => {
                    tracing::info!(endpoint = endpoint.as_str(), "[Extractor] Model endpoint up");
                    return Ok(Self {
                        client,
                        endpoint: endpoint.clone(),
                        auth_token,
                    });
                },
                Err(e) => {
                    tracing::warn!(
                        endpoint = endpoint.as_str(),
                        error = ?e,
                        "[Extractor] Model endpoint unreachable, trying next"
                    );
                },
            }
        }
        anyhow::bail!("No model endpoint reachable out of {} candidates", endpoints.len())
    }
}

#[async_trait]
impl Seq2SeqGenerator for HttpSeq2SeqGenerator {
    async fn generate_batch(&self, inputs: &[String]) -> Result<Vec<String>> {
        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "inputs": inputs,
            "max_length": MAX_LENGTH,
            "num_beams": NUM_BEAMS,
            "early_stopping": true,
        }));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?.error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        let outputs = body
            .get("outputs")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("model response missing outputs array"))?;
        anyhow::ensure!(
            outputs.len() == inputs.len(),
            "model returned {} outputs for {} inputs",
            outputs.len(),
            inputs.len()
        );
        Ok(outputs
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect())
    }
}

/// One record handed to the neural extractor.
#[derive(Clone, Debug)]
pub struct NeuralInput {
    pub term: String,
    pub dol: Option<String>,
}

/// Per-record outcome. `Invalid` carries the error string written to
/// `t5_parse_error`.
#[derive(Clone, Debug, PartialEq)]
pub enum NeuralOutcome {
    Valid(ExtractedFields),
    Invalid { error: String },
}

static OUTPUT_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{2}/\d{2}/\d{4}").unwrap());
static TENURE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s*years?").unwrap());
static SPECIAL_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(christmas|midsummer|lady|michaelmas)(?:\s+day)?\s+(\d{4})").unwrap()
});
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").unwrap());

fn parse_output_date(date_str: &str) -> Option<NaiveDate> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("not specified") {
        return None;
    }
    for fmt in ["%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }
    // Quarter day names occasionally survive into the output.
    let lower = trimmed.to_lowercase();
    for (name, month, day) in QUARTER_DAYS {
        if lower.contains(name) {
            if let Some(year) = YEAR_RE.find(trimmed) {
                let year = year.as_str().parse::<i32>().ok()?;
                return NaiveDate::from_ymd_opt(year, month, day);
            }
        }
    }
    None
}

fn parse_output_tenure(tenure_str: &str) -> Option<f64> {
    let trimmed = tenure_str.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("not specified") {
        return None;
    }
    TENURE_RE
        .captures(trimmed)
        .and_then(|caps| caps[1].parse::<f64>().ok())
}

/// Parse the concatenated model output into the extraction triple.
pub fn parse_model_output(output: &str) -> ExtractedFields {
    let output = output.trim();
    if output.is_empty() {
        return ExtractedFields::default();
    }

    let dates: Vec<&str> = OUTPUT_DATE_RE.find_iter(output).map(|m| m.as_str()).collect();
    let mut fields = ExtractedFields {
        start_date: dates.first().and_then(|d| parse_output_date(d)),
        expiry_date: dates.get(1).and_then(|d| parse_output_date(d)),
        tenure_years: None,
    };

    // Whatever is left after the dates should be the tenure.
    let remaining = OUTPUT_DATE_RE
        .replace_all(output, "")
        .replace("Not specified", "");
    let remaining = remaining.trim().to_string();
    if !remaining.is_empty() {
        fields.tenure_years = parse_output_tenure(&remaining);
    }

    if dates.is_empty() && fields.start_date.is_none() && fields.expiry_date.is_none() {
        fields.tenure_years = parse_output_tenure(output);
        if let Some(caps) = SPECIAL_DAY_RE.captures(output) {
            let year = caps[2].parse::<i32>().ok();
            let name = caps[1].to_lowercase();
            if let Some(year) = year {
                for (day_name, month, day) in QUARTER_DAYS {
                    if name == day_name {
                        fields.start_date = NaiveDate::from_ymd_opt(year, month, day);
                    }
                }
            }
        }
    }

    complete_third_leg(&mut fields);
    fields
}

/// Fill the missing leg when two of the three are present.
fn complete_third_leg(fields: &mut ExtractedFields) {
    if let (Some(start), Some(tenure), None) =
        (fields.start_date, fields.tenure_years, fields.expiry_date)
    {
        fields.expiry_date = add_fractional_years(start, tenure);
    }
    if let (Some(start), Some(expiry), None) =
        (fields.start_date, fields.expiry_date, fields.tenure_years)
    {
        let mut years = full_years_between(start, expiry);
        if let Some(anniversary) = add_years_clamped(start, years) {
            if full_months_between(anniversary, expiry) >= 6 {
                years += 1;
            }
        }
        fields.tenure_years = Some(years as f64);
    }
    if let (Some(expiry), Some(tenure), None) =
        (fields.expiry_date, fields.tenure_years, fields.start_date)
    {
        fields.start_date = add_fractional_years(expiry, -tenure);
    }
}

/// Batch extractor over the external model.
pub struct NeuralExtractor {
    generator: Arc<dyn Seq2SeqGenerator>,
}

impl NeuralExtractor {
    pub fn new(generator: Arc<dyn Seq2SeqGenerator>) -> Self {
        Self { generator }
    }

    /// Extract one outcome per input, in order. A generation failure is
    /// attributed to every record in the batch; it never aborts the caller.
    pub async fn extract_batch(&self, records: &[NeuralInput]) -> Vec<NeuralOutcome> {
        if records.is_empty() {
            return vec![];
        }
        let prompts: Vec<String> = records
            .iter()
            .map(|r| format!("{PROMPT_PREFIX}{}", r.term))
            .collect();
        let outputs = match self.generator.generate_batch(&prompts).await {
            Ok(outputs) => outputs,
            Err(e) => {
                tracing::warn!(error = ?e, "[Extractor] Model generation failed for batch");
                return records
                    .iter()
                    .map(|_| NeuralOutcome::Invalid {
                        error: e.to_string(),
                    })
                    .collect();
            },
        };

        records
            .iter()
            .zip(outputs)
            .map(|(record, output)| parse_and_validate(&output, record.dol.as_deref()))
            .collect()
    }
}

/// Parse one model output, substitute the date of the lease for a missing
/// start, and validate.
pub fn parse_and_validate(raw_output: &str, dol: Option<&str>) -> NeuralOutcome {
    let mut fields = parse_model_output(raw_output);

    if fields.start_date.is_none() {
        if let Some(dol_date) = dol.and_then(parse_dol_date) {
            fields.start_date = Some(dol_date);
            complete_third_leg(&mut fields);
        }
    }

    if !fields.has_two_legs() {
        return NeuralOutcome::Invalid {
            error: "Insufficient data extracted".to_string(),
        };
    }

    if is_lease_term_valid(Some(&fields), None, DEFAULT_TOLERANCE_DAYS) {
        NeuralOutcome::Valid(fields)
    } else {
        NeuralOutcome::Invalid {
            error: "Validation failed".to_string(),
        }
    }
}
