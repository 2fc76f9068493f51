// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Term-string normalization. Collapses the combinatorial space of
//! whitespace, typos and connective variants before the pattern cascade
//! runs. `normalize_term` is idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

impl Rule {
    fn new(pattern: &str, replacement: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).unwrap(),
            replacement,
        }
    }
}

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\u{00A0}]+").unwrap());

// Applied in order after whitespace collapsing. The ordering matters:
// "therein mentioned" must become "the lease" before "as the lease" is
// rewritten to "of the lease".
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        // Non-semantic characters.
        Rule::new(r"[´~¨,]", ""),
        // Leading "Residue of".
        Rule::new(r"(?i)^residue\s+of\s+", ""),
        // Midnight phrases add nothing to the calendar arithmetic.
        Rule::new(r"(?i)\s+midnight\s+on\b", ""),
        Rule::new(r"(?i)\s+midnight\b", ""),
        // Phrase duplications and spelled-out 999.
        Rule::new(r"(?i)\band\s+and\b", "and"),
        Rule::new(r"(?i)\bnine\s+hundred\s+and\s+ninety\s+nine\b", "999"),
        // Vulgar fractions appear next to their already-parsed numeric base.
        Rule::new(r"[¼½¾]", ""),
        // Ordinal suffixes on day numbers: "1st June" -> "1 June".
        Rule::new(r"\b(\d{1,2})(?:st|nd|rd|th)\b", "$1"),
        // "1 of January" -> "1 January".
        Rule::new(r"(?i)\b(\d{1,2})\s+of\s+", "$1 "),
        // Connective canonicalization.
        Rule::new(r"(?i)\bincluding\s+on\b", "including"),
        Rule::new(r"(?i)\bto\s+and\s+expiring\b", "expiring"),
        Rule::new(r"(?i)\ban\s+including\b", "and including"),
        Rule::new(r"(?i)\bbeginning\s+in\b", "beginning on"),
        Rule::new(r"(?i)\bcommences\b", "commencing"),
        Rule::new(r"(?i)\bexpires\b", "expiring"),
        Rule::new(r"(?i)\bfrom:\s*", "From "),
        Rule::new(r"(?i)\bto:\s*", "to "),
        // Colon-separated dates: 12:7:1973 -> 12.7.1973.
        Rule::new(r"\b(\d{1,2}):(\d{1,2}):(\d{4})\b", "$1.$2.$3"),
        // Spelling fixes seen in the corpus.
        Rule::new(r"(?i)\bles\b", "less"),
        Rule::new(r"(?i)\brom\b", "from"),
        Rule::new(r"(?i)\bfrm\b", "from"),
        Rule::new(r"(?i)\bform\b", "from"),
        Rule::new(r"(?i)\bjnuary\b", "January"),
        Rule::new(r"(?i)\bjanuaryu\b", "January"),
        Rule::new(r"(?i)\bfeburary\b", "February"),
        Rule::new(r"(?i)\bfebuary\b", "February"),
        Rule::new(r"(?i)\bseptmber\b", "September"),
        Rule::new(r"(?i)\bnovmber\b", "November"),
        Rule::new(r"(?i)\bdecmber\b", "December"),
        Rule::new(r"(?i)\btherein\s+mentioned\b", "the lease"),
        Rule::new(r"(?i)\bas\s+the\s+lease\b", "of the lease"),
        Rule::new(r"(?i)\bincluding/from\b", "including"),
        // Missing space after "from": "from1 January" -> "from 1 January".
        Rule::new(r"(?i)\bfrom(\d)", "from $1"),
        // Trailing legalese.
        Rule::new(r"(?i)\s+(?:here|there)of\s*$", ""),
    ]
});

/// Normalize a raw term string for the pattern cascade.
pub fn normalize_term(term: &str) -> String {
    let mut text = WHITESPACE_RE.replace_all(term.trim(), " ").into_owned();
    for rule in RULES.iter() {
        text = rule.pattern.replace_all(&text, rule.replacement).into_owned();
    }
    // Character removals can leave doubled spaces behind.
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}
