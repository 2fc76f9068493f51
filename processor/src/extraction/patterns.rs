// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The lease-term pattern cascade.
//!
//! Patterns are data: an ordered list of (description, compiled regex,
//! extractor) entries tried in sequence, where the first match whose
//! captures parse wins. Ordering is load-bearing — explicit start/end
//! patterns run before start+tenure patterns, fractional years run before
//! integer years so "97 3/4" is not consumed as "97", and keyword-less
//! fallbacks run last. Patterns that need the date of the lease are skipped
//! when no `dol` is available. Do not collapse these into one regex.

use crate::{
    extraction::{
        normalize::normalize_term,
        primitives::{
            add_fractional_years, add_months_clamped, add_years_clamped, parse_date,
            parse_dol_date, parse_fractional_years, parse_month_year_date, parse_word_number,
            resolve_special_day, years_between_rounded,
        },
    },
    models::lease_models::lease_term::{ExtractorSource, LeaseTerm},
};
use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

type ExtractFn = fn(&Captures, Option<NaiveDate>) -> Option<LeaseTerm>;

pub struct TermPattern {
    pub description: &'static str,
    pub regex: Regex,
    /// Only tried when the record carries a date of lease.
    pub requires_dol: bool,
    extract: ExtractFn,
}

const NUM_WORDS: &str = "one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|\
                         thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|\
                         twenty|thirty|forty|fifty|sixty|seventy|eighty|ninety|hundred";

// Start connectives: "from", "commencing on and including", "beginning on",
// "starting on the", "on and from", "commencing from and including", ...
const START_KW: &str = r"(?:on\s+and\s+)?(?:from|commencing|beginning|starting)(?:\s+(?:on|from))?(?:\s+and\s+including)?(?:\s+the)?";

// End connectives: "to and including", "and ending on", "until",
// "up to and including", "and expiring on and including", "terminating on", ...
const END_KW: &str = r"(?:and\s+)?(?:up\s+to|to|until|ending|expiring|terminating)(?:\s+on)?(?:\s+and\s+including)?(?:\s+the)?";

// Tolerated between the first date of a range and the end connective.
const RANGE_GLUE: &str = r"(?:\s+inclusive|\s+and\s+including)?";

fn num(name: &str) -> String {
    format!(r"(?P<{name}>\d{{1,4}}|{NUM_WORDS})")
}

fn date_frag(n: u8) -> String {
    format!(
        r"(?:the\s+)?(?P<d{n}>\d{{1,2}})[./\s]+(?P<mo{n}>[a-z]+|\d{{1,2}})[./\s]+(?P<yr{n}>\d{{4}})"
    )
}

fn special_frag(n: u8) -> String {
    format!(r"(?P<sp{n}>christmas|midsummer|lady|michaelmas)(?:\s+day)?\s+(?P<spy{n}>\d{{4}})")
}

// A start anchor: a calendar date or a named quarter day.
fn point_frag(n: u8) -> String {
    format!("(?:{}|{})", date_frag(n), special_frag(n))
}

fn cap<'a>(caps: &'a Captures, name: &str) -> Option<&'a str> {
    caps.name(name).map(|m| m.as_str())
}

fn cap_num(caps: &Captures, name: &str) -> Option<i64> {
    parse_word_number(cap(caps, name)?)
}

fn cap_date(caps: &Captures, n: u8) -> Option<NaiveDate> {
    parse_date(
        cap(caps, &format!("d{n}"))?,
        cap(caps, &format!("mo{n}"))?,
        cap(caps, &format!("yr{n}"))?,
    )
}

fn cap_point(caps: &Captures, n: u8) -> Option<NaiveDate> {
    if caps.name(&format!("d{n}")).is_some() {
        return cap_date(caps, n);
    }
    resolve_special_day(cap(caps, &format!("sp{n}"))?, cap(caps, &format!("spy{n}"))?)
}

fn term(start: NaiveDate, expiry: NaiveDate, tenure_years: f64) -> Option<LeaseTerm> {
    Some(LeaseTerm {
        start_date: start,
        expiry_date: expiry,
        tenure_years,
        source: ExtractorSource::Regex,
    })
}

fn extract_years_with_range(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let years = cap_num(caps, "n")?;
    term(cap_date(caps, 1)?, cap_date(caps, 2)?, years as f64)
}

fn extract_date_range(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let start = cap_date(caps, 1)?;
    let expiry = cap_date(caps, 2)?;
    term(start, expiry, years_between_rounded(start, expiry) as f64)
}

fn extract_from_for_years(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let start = cap_date(caps, 1)?;
    let years = cap_num(caps, "n")?;
    let less_days = cap_num(caps, "lessd").unwrap_or(0);
    let expiry = add_years_clamped(start, years)? - Duration::days(less_days);
    term(start, expiry, years as f64)
}

fn extract_fractional_from(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let years = parse_fractional_years(cap(caps, "frac")?)?;
    let less_days = cap_num(caps, "lessd").unwrap_or(0);
    let start = cap_point(caps, 1)?;
    let expiry = add_fractional_years(start, years)? - Duration::days(less_days);
    term(start, expiry, years)
}

fn extract_years_less_days(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let years = cap_num(caps, "n")?;
    let less_days = cap_num(caps, "lessd")?;
    let start = cap_point(caps, 1)?;
    let expiry = add_years_clamped(start, years)? - Duration::days(less_days);
    term(start, expiry, years as f64)
}

fn extract_years_plus_days(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let years = cap_num(caps, "n")?;
    let plus_days = cap_num(caps, "plusd")?;
    let start = cap_point(caps, 1)?;
    let expiry = add_years_clamped(start, years)? + Duration::days(plus_days);
    term(start, expiry, years as f64)
}

fn extract_years_less_months(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let years = cap_num(caps, "n")?;
    let less_months = cap_num(caps, "lessm")?;
    let start = cap_date(caps, 1)?;
    let expiry = add_months_clamped(add_years_clamped(start, years)?, -less_months)?;
    term(start, expiry, years as f64)
}

fn extract_years_and_months(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let years = cap_num(caps, "n")?;
    let add_months = cap_num(caps, "addm")?;
    let less_days = cap_num(caps, "lessd").unwrap_or(0);
    let start = cap_date(caps, 1)?;
    let expiry = add_months_clamped(add_years_clamped(start, years)?, add_months)?
        - Duration::days(less_days);
    term(start, expiry, years as f64)
}

fn extract_years_from_point(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let years = cap_num(caps, "n")?;
    let start = cap_point(caps, 1)?;
    term(start, add_years_clamped(start, years)?, years as f64)
}

fn extract_years_expiring(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let years = cap_num(caps, "n")?;
    let expiry = cap_date(caps, 1)?;
    term(add_years_clamped(expiry, -years)?, expiry, years as f64)
}

fn extract_start_expires_thereafter(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let start = cap_date(caps, 1)?;
    let years = cap_num(caps, "n")?;
    term(start, add_years_clamped(start, years)?, years as f64)
}

fn extract_years_from_month_year(caps: &Captures, _dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let years = cap_num(caps, "n")?;
    let start = parse_month_year_date(cap(caps, "mon")?, cap(caps, "myr")?)?;
    term(start, add_years_clamped(start, years)?, years as f64)
}

fn extract_years_from_dol(caps: &Captures, dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let years = cap_num(caps, "n")?;
    let start = dol?;
    let less_days = cap_num(caps, "lessd").unwrap_or(0);
    let expiry = add_years_clamped(start, years)? - Duration::days(less_days);
    term(start, expiry, years as f64)
}

fn extract_term_expiring_dol(caps: &Captures, dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    let start = dol?;
    let expiry = cap_date(caps, 1)?;
    term(start, expiry, years_between_rounded(start, expiry) as f64)
}

fn pattern(description: &'static str, body: String, extract: ExtractFn) -> TermPattern {
    TermPattern {
        description,
        regex: Regex::new(&format!("(?i){body}")).unwrap(),
        requires_dol: false,
        extract,
    }
}

fn dol_pattern(description: &'static str, body: String, extract: ExtractFn) -> TermPattern {
    TermPattern {
        requires_dol: true,
        ..pattern(description, body, extract)
    }
}

pub static TERM_PATTERNS: Lazy<Vec<TermPattern>> = Lazy::new(|| {
    let n = num("n");
    let lessd = num("lessd");
    let plusd = num("plusd");
    let lessm = num("lessm");
    let addm = num("addm");
    let d1 = date_frag(1);
    let d2 = date_frag(2);
    let p1 = point_frag(1);
    let s1 = special_frag(1);

    vec![
        // Group 1: stated years with both endpoints.
        pattern(
            "years with explicit start and end dates",
            format!(
                r"(?:a\s+term\s+of\s+)?{n}\s*years?\s+{START_KW}\s+{d1}{RANGE_GLUE}\s+{END_KW}\s+{d2}"
            ),
            extract_years_with_range,
        ),
        // Group 2: date ranges, tenure derived from the calendar.
        pattern(
            "start date for a term of years expiring on end date",
            format!(
                r"{START_KW}\s+{d1}\s+for\s+a\s+term\s+of\s+years\s+(?:expiring|ending)(?:\s+on)?(?:\s+and\s+including)?\s+{d2}"
            ),
            extract_date_range,
        ),
        pattern(
            "start date for a term of stated years",
            format!(
                r"{START_KW}\s+{d1}\s+for\s+(?:(?:a|the)\s+)?(?:term\s+of\s+)?{n}\s+years?(?:\s+less\s+the\s+last\s+{lessd}\s+days?)?"
            ),
            extract_from_for_years,
        ),
        pattern(
            "explicit date range",
            format!(r"{START_KW}\s+{d1}{RANGE_GLUE}\s+{END_KW}\s+{d2}"),
            extract_date_range,
        ),
        pattern(
            "bare date range",
            format!(
                r"{d1}\s+(?:up\s+to|to|until|expiring\s+on|and\s+ending\s+on)\s+(?:and\s+including\s+)?{d2}"
            ),
            extract_date_range,
        ),
        // Group 3: years with modifiers. Fractional years must run before the
        // integer patterns so "97 3/4" is not consumed as "97".
        pattern(
            "fractional years from start date",
            format!(
                r"(?P<frac>\d{{1,4}}\s+\d\s*/\s*\d|\d{{1,4}}\s+and\s+(?:a\s+)?(?:half|quarter))\s+years?\s+(?:\(?\s*less\s+(?:the\s+last\s+)?{lessd}\s+days?\s*\)?\s+)?{START_KW}\s+{p1}"
            ),
            extract_fractional_from,
        ),
        pattern(
            "years less days from start date",
            format!(
                r"(?:a\s+term\s+of\s+)?{n}\s*years?\s*\(?\s*less\s+(?:the\s+last\s+)?{lessd}\s+days?\s*\)?\s+{START_KW}\s+{p1}"
            ),
            extract_years_less_days,
        ),
        pattern(
            "years plus days from start date",
            format!(r"{n}\s*years?\s+(?:plus|and)\s+{plusd}\s+days?\s+{START_KW}\s+{p1}"),
            extract_years_plus_days,
        ),
        pattern(
            "years less months from start date",
            format!(r"{n}\s*years?\s+less\s+{lessm}\s+months?\s+{START_KW}\s+{d1}"),
            extract_years_less_months,
        ),
        pattern(
            "years and months from start date",
            format!(
                r"{n}\s*years?\s+(?:and\s+)?{addm}\s+months?\s+{START_KW}\s+{d1}(?:\s+less\s+the\s+last\s+{lessd}\s+days?)?"
            ),
            extract_years_and_months,
        ),
        // Group 4: years plus a single start (or derived start).
        pattern(
            "years from quarter day",
            format!(r"(?:a\s+term\s+of\s+)?{n}\s*years?\s+{START_KW}\s+{s1}"),
            extract_years_from_point,
        ),
        pattern(
            "years from start date",
            format!(r"(?:a\s+term\s+of\s+)?{n}\s*years?\s+{START_KW}\s+{d1}"),
            extract_years_from_point,
        ),
        pattern(
            "years expiring on end date",
            format!(
                r"{n}\s*years?\s+(?:up\s+to|to|expiring|ending)(?:\s+on)?(?:\s+and\s+including)?\s+{d1}"
            ),
            extract_years_expiring,
        ),
        pattern(
            "start date and expiring years thereafter",
            format!(r"{START_KW}\s+{d1}\s+and\s+expiring\s+{n}\s+years?\s+thereafter"),
            extract_start_expires_thereafter,
        ),
        pattern(
            "years from month and year",
            format!(r"{n}\s*years?\s+{START_KW}\s+(?P<mon>[a-z]+)\s+(?P<myr>\d{{4}})"),
            extract_years_from_month_year,
        ),
        // Group 5: keyword-less fallbacks.
        pattern(
            "years followed by bare date",
            format!(r"{n}\s*years?\s+{d1}"),
            extract_years_from_point,
        ),
        pattern(
            "number missing the years keyword",
            format!(r"{n}\s+from\s+(?:and\s+including\s+)?{d1}"),
            extract_years_from_point,
        ),
        // Group 6: patterns that need the date of the lease.
        dol_pattern(
            "years from the date of the lease",
            format!(r"{n}\s*years?\s+(?:{START_KW}\s+)?(?:the\s+)?date\s+of\s+(?:the\s+)?lease"),
            extract_years_from_dol,
        ),
        dol_pattern(
            "term of years expiring on end date",
            format!(
                r"(?:a\s+)?(?:number\s+of\s+years|term\s+of\s+years|term)\s+(?:expiring|ending)\s+on\s+(?:and\s+including\s+)?{d1}"
            ),
            extract_term_expiring_dol,
        ),
        dol_pattern(
            "expiring on end date alone",
            format!(r"^(?:expiring|ending)\s+on\s+(?:and\s+including\s+)?{d1}"),
            extract_term_expiring_dol,
        ),
        dol_pattern(
            "stated years alone",
            format!(r"^(?:a\s+term\s+of\s+)?{n}\s*years?(?:\s+less\s+{lessd}\s+days?)?\s*$"),
            extract_years_from_dol,
        ),
        dol_pattern(
            "years with dangling start connective",
            format!(r"^{n}\s*years?\s+(?:from|commencing)(?:\s+on)?(?:\s+and\s+including)?\s*$"),
            extract_years_from_dol,
        ),
    ]
});

fn run_cascade(text: &str, dol: Option<NaiveDate>) -> Option<LeaseTerm> {
    for pattern in TERM_PATTERNS.iter() {
        if pattern.requires_dol && dol.is_none() {
            continue;
        }
        if let Some(caps) = pattern.regex.captures(text) {
            if let Some(found) = (pattern.extract)(&caps, dol) {
                return Some(found);
            }
            // Captures that fail to parse are a non-match; keep going.
        }
    }
    None
}

/// Parse a lease term string, optionally using the record's date of lease
/// for patterns that reference it. Returns `None` when no pattern yields a
/// usable result.
pub fn parse_lease_term(term: &str, dol: Option<&str>) -> Option<LeaseTerm> {
    if term.trim().is_empty() {
        return None;
    }
    let normalized = normalize_term(term);
    let dol_date = dol.and_then(parse_dol_date);
    if let Some(found) = run_cascade(&normalized, dol_date) {
        return Some(found);
    }
    // Parenthesized asides can hide an otherwise parseable term; drop one
    // level of brackets and retry once.
    if normalized.contains('(') {
        let stripped = normalized.replace(['(', ')'], " ");
        let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        return run_cascade(&stripped, dol_date);
    }
    None
}
