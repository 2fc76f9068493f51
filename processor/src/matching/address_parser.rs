// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Adapter over the external statistical address parser, plus the
//! normalization applied to raw address strings before the tiered lookup.
//!
//! The parser itself is an external artifact behind [`AddressParser`]; the
//! post-processing here repairs its most common UK failure mode, a building
//! name swallowed into the road component.

use crate::models::address_models::reference_address::MatchCandidate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Keywords that typically end a building or house name.
pub const BUILDING_KEYWORDS: [&str; 16] = [
    "COURT", "LODGE", "HOUSE", "HALL", "MANOR", "TOWER", "TOWERS", "PLACE", "BUILDING",
    "BUILDINGS", "MANSION", "MANSIONS", "CHAMBERS", "ARCADE", "CENTRE", "CENTER",
];

/// The external statistical parser. Implementations return semantic labels
/// (`house_number`, `house`, `unit`, `road`, `city`, `postcode`, ...) mapped
/// to their values.
pub trait AddressParser: Send + Sync {
    fn parse(&self, address: &str) -> HashMap<String, String>;
}

static KEYWORD_SPLIT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    BUILDING_KEYWORDS
        .iter()
        .map(|keyword| Regex::new(&format!(r"(?i)^(.+?\s+{keyword})\s+(.+)$")).unwrap())
        .collect()
});

/// Parse an address and post-process the result: values uppercased, and a
/// building-keyword prefix split out of `road` into `house` when the parser
/// conflated them ("35 ST KEYNA COURT TEMPLE STREET" -> house
/// "35 ST KEYNA COURT", road "TEMPLE STREET").
pub fn parse_address_string(parser: &dyn AddressParser, address: &str) -> HashMap<String, String> {
    let mut result: HashMap<String, String> = parser
        .parse(address)
        .into_iter()
        .map(|(label, value)| (label, value.to_uppercase()))
        .collect();
    extract_building_from_road(&mut result);
    result
}

fn extract_building_from_road(result: &mut HashMap<String, String>) {
    if result.contains_key("house") {
        return;
    }
    let road = match result.get("road") {
        Some(road) if !road.is_empty() => road.clone(),
        _ => return,
    };
    for splitter in KEYWORD_SPLIT_RES.iter() {
        if let Some(caps) = splitter.captures(&road) {
            let building_name = caps[1].trim().to_string();
            let street_name = caps[2].trim().to_string();
            match result.remove("house_number") {
                Some(house_number) if !house_number.is_empty() => {
                    result.insert("house".to_string(), format!("{house_number} {building_name}"));
                },
                _ => {
                    result.insert("house".to_string(), building_name);
                },
            }
            result.insert("road".to_string(), street_name);
            return;
        }
    }
}

/// Drop everything before the first comma when the address carries more than
/// one: leading flat descriptors confuse the statistical parser.
pub fn normalise_address(address: &str) -> String {
    let trimmed = address.trim();
    if trimmed.matches(',').count() > 1 {
        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        return parts[1..].join(", ");
    }
    trimmed.to_string()
}

/// "153-157 NEW BOND STREET" style ranges keep their left edge.
pub fn normalise_house_number(house_number: &str) -> String {
    let trimmed = house_number.trim();
    match trimmed.split_once('-') {
        Some((left, _)) => left.trim().to_string(),
        None => trimmed.to_string(),
    }
}

static LEADING_DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)").unwrap());

/// The leading digit run of a house number, for the fuzzy tiers:
/// "85A" -> "85", "153-157" -> "153".
pub fn extract_base_number(house_number: &str) -> String {
    let single = match house_number.split_once('-') {
        Some((left, _)) => left.trim(),
        None => house_number,
    };
    match LEADING_DIGITS_RE.captures(single) {
        Some(caps) => caps[1].to_string(),
        None => single.to_string(),
    }
}

fn get_trimmed(parsed: &HashMap<String, String>, label: &str) -> String {
    parsed.get(label).map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Build a lookup candidate from a source document's address fields.
/// Returns `None` when no house number and road can be recovered — the
/// caller records those as not-found.
pub fn build_match_candidate(
    parser: &dyn AddressParser,
    uid: &str,
    apd_original: &str,
    pc: &str,
    uprn: &str,
) -> Option<MatchCandidate> {
    let apd = normalise_address(apd_original);
    if apd.is_empty() {
        return None;
    }

    let parsed = parse_address_string(parser, &apd);
    let mut house_number = get_trimmed(&parsed, "house_number");
    let house = get_trimmed(&parsed, "house");
    let mut postcode = get_trimmed(&parsed, "postcode");
    let mut city = get_trimmed(&parsed, "city");
    let mut road = get_trimmed(&parsed, "road");

    if house_number.is_empty() {
        if !house.is_empty() && !pc.trim().is_empty() {
            // Some records write the building name where the number goes.
            house_number = house;
        } else {
            // Last resort: re-parse the original, unnormalized string.
            let reparsed = parse_address_string(parser, apd_original);
            house_number = get_trimmed(&reparsed, "house_number");
            if house_number.is_empty() {
                house_number = get_trimmed(&reparsed, "house");
            }
            if road.is_empty() {
                road = get_trimmed(&reparsed, "road");
            }
            if postcode.is_empty() {
                postcode = get_trimmed(&reparsed, "postcode");
            }
            if city.is_empty() {
                city = get_trimmed(&reparsed, "city");
            }
        }
    }

    if house_number.is_empty() || road.is_empty() {
        return None;
    }

    let final_postcode = if postcode.is_empty() {
        pc.trim().to_string()
    } else {
        postcode
    };
    let use_city_match = final_postcode.is_empty() && !city.is_empty();

    Some(MatchCandidate {
        uid: uid.to_string(),
        apd_original: apd_original.to_string(),
        apd,
        pc: final_postcode,
        city: use_city_match.then_some(city),
        house_number: normalise_house_number(&house_number),
        road,
        uprn: uprn.to_string(),
    })
}

/// [`AddressParser`] backed by libpostal. The trained data files have to be
/// present on the host, so this lives behind the `libpostal` feature.
#[cfg(feature = "libpostal")]
pub mod libpostal {
    use super::AddressParser;
    use std::collections::HashMap;

    pub struct LibpostalParser {
        inner: libpostal_rs::AddressParser,
    }

    impl LibpostalParser {
        pub fn new() -> Self {
            Self {
                inner: libpostal_rs::AddressParser::new(),
            }
        }
    }

    impl Default for LibpostalParser {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AddressParser for LibpostalParser {
        fn parse(&self, address: &str) -> HashMap<String, String> {
            let mut result = HashMap::new();
            let parsed = match self.inner.parse(address) {
                Ok(parsed) => parsed,
                Err(_) => return result,
            };
            for (label, value) in [
                ("house_number", parsed.house_number),
                ("road", parsed.road),
                ("unit", parsed.unit),
                ("postcode", parsed.postcode),
                ("city", parsed.city),
                ("suburb", parsed.suburb),
            ] {
                if let Some(value) = value {
                    result.insert(label.to_string(), value);
                }
            }
            result
        }
    }
}
