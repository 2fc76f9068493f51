// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Date and number primitives shared by the pattern engine, the neural
//! output parser and the validator. Everything returns `Option`; nothing
//! here panics on bad input.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// The traditional English quarter days, used as lease commencement anchors.
pub const QUARTER_DAYS: [(&str, u32, u32); 4] = [
    ("christmas", 12, 25),
    ("midsummer", 6, 24),
    ("lady", 3, 25),
    ("michaelmas", 9, 29),
];

static WORD_NUMBERS: Lazy<HashMap<&'static str, i64>> = Lazy::new(|| {
    HashMap::from([
        ("one", 1),
        ("two", 2),
        ("three", 3),
        ("four", 4),
        ("five", 5),
        ("six", 6),
        ("seven", 7),
        ("eight", 8),
        ("nine", 9),
        ("ten", 10),
        ("eleven", 11),
        ("twelve", 12),
        ("thirteen", 13),
        ("fourteen", 14),
        ("fifteen", 15),
        ("sixteen", 16),
        ("seventeen", 17),
        ("eighteen", 18),
        ("nineteen", 19),
        ("twenty", 20),
        ("thirty", 30),
        ("forty", 40),
        ("fifty", 50),
        ("sixty", 60),
        ("seventy", 70),
        ("eighty", 80),
        ("ninety", 90),
        ("hundred", 100),
    ])
});

fn month_from_name(month: &str) -> Option<u32> {
    let lower = month.trim().to_lowercase();
    if lower.chars().all(|c| c.is_ascii_digit()) {
        let m = lower.parse::<u32>().ok()?;
        return (1..=12).contains(&m).then_some(m);
    }
    let m = match lower.as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sept" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(m)
}

/// Parse date components: full month name, abbreviated month name, or
/// numeric month (covers dates like `29.9.1909`).
pub fn parse_date(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let day = day.trim().parse::<u32>().ok()?;
    let month = month_from_name(month)?;
    let year = year.trim().parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a month-year pair with the day defaulting to the 1st
/// (e.g. "December 2023" in "999 years from and including December 2023").
pub fn parse_month_year_date(month: &str, year: &str) -> Option<NaiveDate> {
    let month = month_from_name(month)?;
    let year = year.trim().parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Convert a digit run (embedded noise like `~` or commas is ignored) or a
/// lowercased English word number to an integer.
pub fn parse_word_number(word: &str) -> Option<i64> {
    let digits: String = word.chars().filter(|c| c.is_ascii_digit()).collect();
    if !digits.is_empty() {
        return digits.parse::<i64>().ok();
    }
    WORD_NUMBERS.get(word.trim().to_lowercase().as_str()).copied()
}

static FRACTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,4})\s+(\d)\s*/\s*(\d)$").unwrap());
static AND_HALF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,4})\s+and\s+(?:a\s+)?half$").unwrap());
static AND_QUARTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,4})\s+and\s+(?:a\s+)?quarter$").unwrap());

/// Parse a possibly-fractional year quantity: "97 3/4", "65 and half",
/// "52 and a quarter", or a plain integer / word number.
pub fn parse_fractional_years(text: &str) -> Option<f64> {
    let trimmed = text.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(caps) = FRACTION_RE.captures(&trimmed) {
        let whole = caps[1].parse::<f64>().ok()?;
        let numerator = caps[2].parse::<f64>().ok()?;
        let denominator = caps[3].parse::<f64>().ok()?;
        if denominator == 0.0 {
            return None;
        }
        return Some(whole + numerator / denominator);
    }
    if let Some(caps) = AND_HALF_RE.captures(&trimmed) {
        return Some(caps[1].parse::<f64>().ok()? + 0.5);
    }
    if let Some(caps) = AND_QUARTER_RE.captures(&trimmed) {
        return Some(caps[1].parse::<f64>().ok()? + 0.25);
    }
    parse_word_number(&trimmed).map(|n| n as f64)
}

/// Resolve a named quarter day ("Christmas Day 1900", "Midsummer", "Lady
/// Day", "Michaelmas") for a given year. Case-insensitive.
pub fn resolve_special_day(name: &str, year: &str) -> Option<NaiveDate> {
    let lower = name.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    let stripped = lower.strip_suffix(" day").unwrap_or(&lower);
    let year = year.trim().parse::<i32>().ok()?;
    for (day_name, month, day) in QUARTER_DAYS {
        if stripped == day_name {
            return NaiveDate::from_ymd_opt(year, month, day);
        }
    }
    None
}

/// Parse a date-of-lease string: day-month-year with `-`, `/` or `.`
/// separators.
pub fn parse_dol_date(dol: &str) -> Option<NaiveDate> {
    let trimmed = dol.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in ["%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }
    None
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    for day in [31, 30, 29, 28] {
        if NaiveDate::from_ymd_opt(year, month, day).is_some() {
            return day;
        }
    }
    28
}

/// Add whole years, clamping 29 February to 28 February on non-leap targets.
pub fn add_years_clamped(date: NaiveDate, years: i64) -> Option<NaiveDate> {
    let year = i32::try_from(date.year() as i64 + years).ok()?;
    let day = date.day().min(last_day_of_month(year, date.month()));
    NaiveDate::from_ymd_opt(year, date.month(), day)
}

/// Add whole months, clamping the day to the end of the target month.
pub fn add_months_clamped(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let zero_based = date.year() as i64 * 12 + date.month0() as i64 + months;
    let year = i32::try_from(zero_based.div_euclid(12)).ok()?;
    let month = zero_based.rem_euclid(12) as u32 + 1;
    let day = date.day().min(last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Add a fractional year quantity: the whole years, then the fractional part
/// converted to whole months (rounded to nearest). Negative values walk
/// backwards, which is how an expiry-anchored start date is derived.
pub fn add_fractional_years(date: NaiveDate, years: f64) -> Option<NaiveDate> {
    let whole = years.trunc() as i64;
    let months = ((years - years.trunc()) * 12.0).round() as i64;
    add_months_clamped(add_years_clamped(date, whole)?, months)
}

/// Number of complete calendar years from `start` to `end`.
pub fn full_years_between(start: NaiveDate, end: NaiveDate) -> i64 {
    let mut years = end.year() as i64 - start.year() as i64;
    while years > 0 {
        match add_years_clamped(start, years) {
            Some(anniversary) if anniversary <= end => break,
            _ => years -= 1,
        }
    }
    years.max(0)
}

/// Calendar-aware tenure between two dates: the complete-year count, rounded
/// up when the end falls within 30 days of the next anniversary. Covers
/// terms written as one day short ("24 June 2020 to 23 June 2025" is 5
/// years, not 4).
pub fn years_between_rounded(start: NaiveDate, end: NaiveDate) -> i64 {
    let years = full_years_between(start, end);
    if let Some(next_anniversary) = add_years_clamped(start, years + 1) {
        if next_anniversary.signed_duration_since(end).num_days() <= 30 {
            return years + 1;
        }
    }
    years
}

/// Complete months from `start` to `end` (assumes `end >= start`).
pub fn full_months_between(start: NaiveDate, end: NaiveDate) -> i64 {
    let mut months =
        (end.year() as i64 * 12 + end.month0() as i64) - (start.year() as i64 * 12 + start.month0() as i64);
    if end.day() < start.day() {
        months -= 1;
    }
    months.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_full_month_name() {
        assert_eq!(parse_date("24", "June", "1862"), Some(date(1862, 6, 24)));
    }

    #[test]
    fn test_parse_abbreviated_month() {
        assert_eq!(parse_date("1", "Apr", "1982"), Some(date(1982, 4, 1)));
    }

    #[test]
    fn test_parse_numeric_month() {
        assert_eq!(parse_date("29", "9", "1909"), Some(date(1909, 9, 29)));
    }

    #[test]
    fn test_parse_invalid_date() {
        assert_eq!(parse_date("invalid", "invalid", "invalid"), None);
        assert_eq!(parse_date("31", "February", "2000"), None);
    }

    #[test]
    fn test_parse_digit_string() {
        assert_eq!(parse_word_number("99"), Some(99));
        assert_eq!(parse_word_number("10"), Some(10));
    }

    #[test]
    fn test_parse_digit_with_tilde() {
        assert_eq!(parse_word_number("98~"), Some(98));
    }

    #[test]
    fn test_parse_word_numbers() {
        assert_eq!(parse_word_number("one"), Some(1));
        assert_eq!(parse_word_number("ten"), Some(10));
        assert_eq!(parse_word_number("Twenty"), Some(20));
    }

    #[test]
    fn test_parse_invalid_word() {
        assert_eq!(parse_word_number("invalid"), None);
    }

    #[test]
    fn test_parse_fractional_years() {
        assert_eq!(parse_fractional_years("97 3/4"), Some(97.75));
        assert_eq!(parse_fractional_years("54 1/4"), Some(54.25));
        assert_eq!(parse_fractional_years("65 and half"), Some(65.5));
        assert_eq!(parse_fractional_years("95 and a half"), Some(95.5));
        assert_eq!(parse_fractional_years("52 and a quarter"), Some(52.25));
        assert_eq!(parse_fractional_years("99"), Some(99.0));
        assert_eq!(parse_fractional_years(""), None);
    }

    #[test]
    fn test_resolve_special_days() {
        assert_eq!(
            resolve_special_day("Christmas Day", "1900"),
            Some(date(1900, 12, 25))
        );
        assert_eq!(resolve_special_day("Christmas", "1950"), Some(date(1950, 12, 25)));
        assert_eq!(
            resolve_special_day("Midsummer Day", "1852"),
            Some(date(1852, 6, 24))
        );
        assert_eq!(resolve_special_day("Midsummer", "1881"), Some(date(1881, 6, 24)));
        assert_eq!(resolve_special_day("Lady Day", "1900"), Some(date(1900, 3, 25)));
        assert_eq!(
            resolve_special_day("Michaelmas", "1900"),
            Some(date(1900, 9, 29))
        );
        assert_eq!(
            resolve_special_day("michaelmas day", "1900"),
            Some(date(1900, 9, 29))
        );
        assert_eq!(resolve_special_day("Unknown Day", "1900"), None);
        assert_eq!(resolve_special_day("Christmas Day", "invalid"), None);
        assert_eq!(resolve_special_day("", "1900"), None);
        assert_eq!(resolve_special_day("Christmas Day", ""), None);
    }

    #[test]
    fn test_parse_dol_date_formats() {
        assert_eq!(parse_dol_date("16-10-1866"), Some(date(1866, 10, 16)));
        assert_eq!(parse_dol_date("16/10/1866"), Some(date(1866, 10, 16)));
        assert_eq!(parse_dol_date("16.10.1866"), Some(date(1866, 10, 16)));
        assert_eq!(parse_dol_date("  16-10-1866  "), Some(date(1866, 10, 16)));
        assert_eq!(parse_dol_date(""), None);
        assert_eq!(parse_dol_date("invalid"), None);
    }

    #[test]
    fn test_parse_month_year_date() {
        assert_eq!(parse_month_year_date("December", "2023"), Some(date(2023, 12, 1)));
        assert_eq!(parse_month_year_date("Jan", "2020"), Some(date(2020, 1, 1)));
        assert_eq!(parse_month_year_date("6", "2025"), Some(date(2025, 6, 1)));
    }

    #[test]
    fn test_add_years_clamps_leap_day() {
        assert_eq!(add_years_clamped(date(2020, 2, 29), 1), Some(date(2021, 2, 28)));
        assert_eq!(add_years_clamped(date(2020, 2, 29), 4), Some(date(2024, 2, 29)));
    }

    #[test]
    fn test_add_months_clamps_to_month_end() {
        assert_eq!(add_months_clamped(date(2021, 1, 31), 1), Some(date(2021, 2, 28)));
        assert_eq!(add_months_clamped(date(2021, 3, 31), -1), Some(date(2021, 2, 28)));
        assert_eq!(add_months_clamped(date(1585, 9, 29), 5991), Some(date(2084, 12, 29)));
    }

    #[test]
    fn test_add_fractional_years() {
        // 97.75 years = 97 years + 9 months
        assert_eq!(
            add_fractional_years(date(1866, 3, 25), 97.75),
            Some(date(1963, 12, 25))
        );
        // 54.25 years = 54 years + 3 months
        assert_eq!(
            add_fractional_years(date(1898, 6, 24), 54.25),
            Some(date(1952, 9, 24))
        );
        assert_eq!(
            add_fractional_years(date(1851, 9, 29), 76.75),
            Some(date(1928, 6, 29))
        );
    }

    #[test]
    fn test_years_between_rounds_up_within_30_days() {
        // One day short of five years.
        assert_eq!(years_between_rounded(date(2020, 6, 24), date(2025, 6, 23)), 5);
        // 30 days short still rounds up.
        assert_eq!(years_between_rounded(date(2016, 9, 1), date(3015, 8, 2)), 999);
        // Well short does not.
        assert_eq!(years_between_rounded(date(2006, 4, 7), date(2021, 9, 1)), 15);
        assert_eq!(years_between_rounded(date(2006, 4, 28), date(2172, 12, 24)), 166);
        // Exact anniversaries are unchanged.
        assert_eq!(years_between_rounded(date(1860, 9, 28), date(2160, 9, 28)), 300);
    }

    #[test]
    fn test_full_months_between() {
        assert_eq!(full_months_between(date(2020, 1, 15), date(2020, 3, 15)), 2);
        assert_eq!(full_months_between(date(2020, 1, 15), date(2020, 3, 14)), 1);
    }
}
