// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of the national address reference (`ab_plus`).
///
/// The primary key is the load-time surrogate `id`, not the UPRN: synthetic
/// rows produced by denormalization share everything but their (negative)
/// UPRN with their parent. Positive UPRN = original row, negative =
/// synthetic.
#[derive(Clone, Debug, Deserialize, QueryableByName, Serialize)]
#[diesel(table_name = crate::schema::ab_plus)]
pub struct ReferenceAddress {
    pub id: i64,
    pub uprn: Option<i64>,
    pub os_address_toid: Option<String>,
    pub udprn: Option<i32>,
    pub organisation_name: Option<String>,
    pub department_name: Option<String>,
    pub po_box_number: Option<String>,
    pub sub_building_name: Option<String>,
    pub building_name: Option<String>,
    pub building_number: Option<String>,
    pub dependent_thoroughfare: Option<String>,
    pub thoroughfare: Option<String>,
    pub post_town: Option<String>,
    pub double_dependent_locality: Option<String>,
    pub dependent_locality: Option<String>,
    pub postcode: Option<String>,
    pub postcode_type: Option<String>,
    pub x_coordinate: Option<f64>,
    pub y_coordinate: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rpc: Option<i32>,
    pub country: Option<String>,
    pub change_type: Option<String>,
    pub la_start_date: Option<NaiveDate>,
    pub rm_start_date: Option<NaiveDate>,
    pub last_update_date: Option<NaiveDate>,
    pub class: Option<String>,
}

/// Column order used for the found-addresses CSV. Matches the table layout so
/// downstream joins line up with the reference schema.
pub const REFERENCE_CSV_COLUMNS: [&str; 28] = [
    "id",
    "uprn",
    "os_address_toid",
    "udprn",
    "organisation_name",
    "department_name",
    "po_box_number",
    "sub_building_name",
    "building_name",
    "building_number",
    "dependent_thoroughfare",
    "thoroughfare",
    "post_town",
    "double_dependent_locality",
    "dependent_locality",
    "postcode",
    "postcode_type",
    "x_coordinate",
    "y_coordinate",
    "latitude",
    "longitude",
    "rpc",
    "country",
    "change_type",
    "la_start_date",
    "rm_start_date",
    "last_update_date",
    "class",
];

fn opt_string<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn opt_date(value: &Option<NaiveDate>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

impl ReferenceAddress {
    /// Field values in `REFERENCE_CSV_COLUMNS` order, absent values as empty
    /// cells.
    pub fn csv_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            opt_string(&self.uprn),
            opt_string(&self.os_address_toid),
            opt_string(&self.udprn),
            opt_string(&self.organisation_name),
            opt_string(&self.department_name),
            opt_string(&self.po_box_number),
            opt_string(&self.sub_building_name),
            opt_string(&self.building_name),
            opt_string(&self.building_number),
            opt_string(&self.dependent_thoroughfare),
            opt_string(&self.thoroughfare),
            opt_string(&self.post_town),
            opt_string(&self.double_dependent_locality),
            opt_string(&self.dependent_locality),
            opt_string(&self.postcode),
            opt_string(&self.postcode_type),
            opt_string(&self.x_coordinate),
            opt_string(&self.y_coordinate),
            opt_string(&self.latitude),
            opt_string(&self.longitude),
            opt_string(&self.rpc),
            opt_string(&self.country),
            opt_string(&self.change_type),
            opt_date(&self.la_start_date),
            opt_date(&self.rm_start_date),
            opt_date(&self.last_update_date),
            opt_string(&self.class),
        ]
    }
}

/// A reference row matched to a source document, with the lookup provenance
/// the enricher needs.
#[derive(Clone, Debug)]
pub struct MatchedAddress {
    pub address: ReferenceAddress,
    pub uid: String,
    /// The raw address string the document carried.
    pub original_apd: String,
    /// The UPRN hint from the document, empty when absent.
    pub uprn: String,
    /// 1 = exact number, 2 = exact name, 3 = fuzzy number, 4 = fuzzy name.
    /// Absent for UPRN-tier hits.
    pub match_priority: Option<i32>,
}

/// A document whose address could not be matched. Retains enough to retry
/// and to geocode by postcode alone.
#[derive(Clone, Debug, PartialEq)]
pub struct UnmatchedAddress {
    pub uid: String,
    pub apd_original: String,
    pub apd: String,
    pub pc: String,
    pub uprn: String,
}

/// A parsed, normalized input address ready for the tiered lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchCandidate {
    pub uid: String,
    pub apd_original: String,
    pub apd: String,
    /// Postcode from the parse, falling back to the document's `pc` field.
    pub pc: String,
    /// Set only when no postcode is available; matched against post_town.
    pub city: Option<String>,
    pub house_number: String,
    pub road: String,
    pub uprn: String,
}

impl MatchCandidate {
    pub fn unmatched(&self) -> UnmatchedAddress {
        UnmatchedAddress {
            uid: self.uid.clone(),
            apd_original: self.apd_original.clone(),
            apd: self.apd.clone(),
            pc: self.pc.clone(),
            uprn: self.uprn.clone(),
        }
    }
}
