// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which extractor produced a lease term.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorSource {
    Regex,
    Neural,
}

impl ExtractorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorSource::Regex => "regex",
            ExtractorSource::Neural => "neural",
        }
    }
}

/// A fully extracted lease tenure. `tenure_years` is quarter-fractional
/// (e.g. 97.75 for "97 3/4 years").
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LeaseTerm {
    pub start_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub tenure_years: f64,
    pub source: ExtractorSource,
}

/// The partially filled extraction triple. The neural output parser produces
/// this shape before third-leg completion, and the validator accepts it so
/// both extractors share one validation path.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ExtractedFields {
    pub start_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub tenure_years: Option<f64>,
}

impl ExtractedFields {
    /// At least two of the three legs are present, so the third can be
    /// derived.
    pub fn has_two_legs(&self) -> bool {
        let present = [
            self.start_date.is_some(),
            self.expiry_date.is_some(),
            self.tenure_years.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();
        present >= 2
    }
}

impl From<&LeaseTerm> for ExtractedFields {
    fn from(term: &LeaseTerm) -> Self {
        Self {
            start_date: Some(term.start_date),
            expiry_date: Some(term.expiry_date),
            tenure_years: Some(term.tenure_years),
        }
    }
}
