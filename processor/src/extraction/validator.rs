// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Consistency validation for extracted lease terms. Errors make a term
//! unusable; warnings are advisory and recorded but leave it valid.

use crate::{
    extraction::primitives::add_fractional_years,
    models::lease_models::lease_term::{ExtractedFields, LeaseTerm},
};
use chrono::{NaiveDate, Utc};

pub const DEFAULT_TOLERANCE_DAYS: i64 = 10;
const MAX_TENURE_YEARS: f64 = 1000.0;
const MIN_REASONABLE_START: (i32, u32, u32) = (1800, 1, 1);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationCode {
    // Errors.
    NullData,
    MissingField,
    InvalidDateOrder,
    InvalidTenure,
    // Warnings.
    TenureMismatch,
    FutureStartDate,
    UnreasonableStartDate,
    ExcessiveTenure,
    LeaseExpired,
}

#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub code: ValidationCode,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Warnings are acceptable; only errors invalidate the term.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn add_error(&mut self, code: ValidationCode, message: String) {
        self.errors.push(ValidationIssue { code, message });
    }

    fn add_warning(&mut self, code: ValidationCode, message: String) {
        self.warnings.push(ValidationIssue { code, message });
    }
}

/// Validate an extraction result against a reference date (defaults to
/// today). Missing-field checks apply to the partially filled shape the
/// neural parser produces; the regex engine always hands over all three
/// legs.
pub fn validate_lease_term(
    data: Option<&ExtractedFields>,
    reference_date: Option<NaiveDate>,
    tolerance_days: i64,
) -> ValidationResult {
    let mut result = ValidationResult::default();
    let reference_date = reference_date.unwrap_or_else(|| Utc::now().date_naive());

    let data = match data {
        Some(data) => data,
        None => {
            result.add_error(
                ValidationCode::NullData,
                "Lease data is missing - parsing may have failed".to_string(),
            );
            return result;
        },
    };

    for (field, present) in [
        ("start_date", data.start_date.is_some()),
        ("expiry_date", data.expiry_date.is_some()),
        ("tenure_years", data.tenure_years.is_some()),
    ] {
        if !present {
            result.add_error(
                ValidationCode::MissingField,
                format!("Required field '{field}' is missing"),
            );
        }
    }
    if !result.is_valid() {
        return result;
    }

    let start_date = data.start_date.unwrap();
    let expiry_date = data.expiry_date.unwrap();
    let tenure_years = data.tenure_years.unwrap();

    if start_date >= expiry_date {
        result.add_error(
            ValidationCode::InvalidDateOrder,
            format!(
                "start_date ({start_date}) must be before expiry_date ({expiry_date})"
            ),
        );
    }

    if tenure_years <= 0.0 {
        result.add_error(
            ValidationCode::InvalidTenure,
            format!("tenure_years must be positive, got {tenure_years}"),
        );
    }

    if tenure_years > 0.0 {
        if let Some(calculated_expiry) = add_fractional_years(start_date, tenure_years) {
            let date_diff = calculated_expiry
                .signed_duration_since(expiry_date)
                .num_days()
                .abs();
            if date_diff > tolerance_days {
                result.add_warning(
                    ValidationCode::TenureMismatch,
                    format!(
                        "start_date + tenure_years ({calculated_expiry}) differs from expiry_date ({expiry_date}) by {date_diff} days"
                    ),
                );
            }
        }
    }

    if start_date > reference_date {
        result.add_warning(
            ValidationCode::FutureStartDate,
            format!("start_date ({start_date}) is in the future"),
        );
    }

    let (y, m, d) = MIN_REASONABLE_START;
    let min_reasonable = NaiveDate::from_ymd_opt(y, m, d).unwrap();
    if start_date < min_reasonable {
        result.add_warning(
            ValidationCode::UnreasonableStartDate,
            format!("start_date ({start_date}) is before 1800, which seems unreasonable"),
        );
    }

    if tenure_years > MAX_TENURE_YEARS {
        result.add_warning(
            ValidationCode::ExcessiveTenure,
            format!("tenure_years ({tenure_years}) exceeds {MAX_TENURE_YEARS} years, which seems excessive"),
        );
    }

    if expiry_date < reference_date {
        result.add_warning(
            ValidationCode::LeaseExpired,
            format!("Lease has expired on {expiry_date}"),
        );
    }

    result
}

/// Quick validity check.
pub fn is_lease_term_valid(
    data: Option<&ExtractedFields>,
    reference_date: Option<NaiveDate>,
    tolerance_days: i64,
) -> bool {
    validate_lease_term(data, reference_date, tolerance_days).is_valid()
}

/// Validate a fully extracted term.
pub fn validate_term(term: &LeaseTerm, reference_date: Option<NaiveDate>) -> ValidationResult {
    validate_lease_term(
        Some(&ExtractedFields::from(term)),
        reference_date,
        DEFAULT_TOLERANCE_DAYS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lease_models::lease_term::ExtractorSource;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn reference() -> Option<NaiveDate> {
        Some(date(2025, 6, 1))
    }

    fn fields(start: (i32, u32, u32), expiry: (i32, u32, u32), tenure: f64) -> ExtractedFields {
        ExtractedFields {
            start_date: Some(date(start.0, start.1, start.2)),
            expiry_date: Some(date(expiry.0, expiry.1, expiry.2)),
            tenure_years: Some(tenure),
        }
    }

    fn codes(issues: &[ValidationIssue]) -> Vec<ValidationCode> {
        issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn valid_term_passes() {
        let data = fields((1900, 6, 24), (1999, 6, 24), 99.0);
        let result = validate_lease_term(Some(&data), reference(), DEFAULT_TOLERANCE_DAYS);
        assert!(result.is_valid());
        // Expired lease is only a warning.
        assert_eq!(codes(&result.warnings), vec![ValidationCode::LeaseExpired]);
    }

    #[test]
    fn missing_data_is_an_error() {
        let result = validate_lease_term(None, reference(), DEFAULT_TOLERANCE_DAYS);
        assert!(!result.is_valid());
        assert_eq!(codes(&result.errors), vec![ValidationCode::NullData]);
    }

    #[test]
    fn missing_fields_are_errors() {
        let data = ExtractedFields {
            start_date: Some(date(1900, 1, 1)),
            expiry_date: None,
            tenure_years: None,
        };
        let result = validate_lease_term(Some(&data), reference(), DEFAULT_TOLERANCE_DAYS);
        assert!(!result.is_valid());
        assert_eq!(
            codes(&result.errors),
            vec![ValidationCode::MissingField, ValidationCode::MissingField]
        );
    }

    #[test]
    fn inverted_dates_are_an_error() {
        let data = fields((1999, 6, 24), (1900, 6, 24), 99.0);
        let result = validate_lease_term(Some(&data), reference(), DEFAULT_TOLERANCE_DAYS);
        assert!(!result.is_valid());
        assert!(codes(&result.errors).contains(&ValidationCode::InvalidDateOrder));
    }

    #[test]
    fn non_positive_tenure_is_an_error() {
        let data = fields((1900, 6, 24), (1999, 6, 24), 0.0);
        let result = validate_lease_term(Some(&data), reference(), DEFAULT_TOLERANCE_DAYS);
        assert!(!result.is_valid());
        assert!(codes(&result.errors).contains(&ValidationCode::InvalidTenure));
    }

    #[test]
    fn tenure_mismatch_is_a_warning() {
        let data = fields((1900, 6, 24), (1999, 6, 24), 50.0);
        let result = validate_lease_term(Some(&data), reference(), DEFAULT_TOLERANCE_DAYS);
        assert!(result.is_valid());
        assert!(codes(&result.warnings).contains(&ValidationCode::TenureMismatch));
    }

    #[test]
    fn tenure_mismatch_within_tolerance_is_clean() {
        // Expiry a week short of the anniversary.
        let data = fields((2000, 6, 24), (2099, 6, 17), 99.0);
        let result = validate_lease_term(Some(&data), reference(), DEFAULT_TOLERANCE_DAYS);
        assert!(result.is_valid());
        assert!(!codes(&result.warnings).contains(&ValidationCode::TenureMismatch));
    }

    #[test]
    fn fractional_tenures_validate_cleanly() {
        // 97.75 years = 97 years 9 months exactly.
        let data = fields((1866, 3, 25), (1963, 12, 25), 97.75);
        let result = validate_lease_term(Some(&data), reference(), DEFAULT_TOLERANCE_DAYS);
        assert!(result.is_valid());
        assert!(!codes(&result.warnings).contains(&ValidationCode::TenureMismatch));
    }

    #[test]
    fn future_start_is_a_warning() {
        let data = fields((2030, 1, 1), (2129, 1, 1), 99.0);
        let result = validate_lease_term(Some(&data), reference(), DEFAULT_TOLERANCE_DAYS);
        assert!(result.is_valid());
        assert!(codes(&result.warnings).contains(&ValidationCode::FutureStartDate));
    }

    #[test]
    fn pre_1800_start_is_a_warning() {
        let data = fields((1585, 9, 29), (2085, 9, 29), 500.0);
        let result = validate_lease_term(Some(&data), reference(), DEFAULT_TOLERANCE_DAYS);
        assert!(result.is_valid());
        assert!(codes(&result.warnings).contains(&ValidationCode::UnreasonableStartDate));
    }

    #[test]
    fn excessive_tenure_is_a_warning() {
        let data = fields((1900, 1, 1), (3100, 1, 1), 1200.0);
        let result = validate_lease_term(Some(&data), reference(), DEFAULT_TOLERANCE_DAYS);
        assert!(result.is_valid());
        assert!(codes(&result.warnings).contains(&ValidationCode::ExcessiveTenure));
    }

    #[test]
    fn validate_term_accepts_lease_term() {
        let term = LeaseTerm {
            start_date: date(2000, 6, 24),
            expiry_date: date(2099, 6, 24),
            tenure_years: 99.0,
            source: ExtractorSource::Regex,
        };
        assert!(validate_term(&term, reference()).is_valid());
    }
}
