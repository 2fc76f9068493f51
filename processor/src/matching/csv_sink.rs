// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! CSV outputs of the matching pass. Both files are opened in append mode so
//! an interrupted run resumes where it left off; the found-addresses header
//! is written on the first hit of the first run and reused afterwards.

use crate::models::address_models::reference_address::{
    MatchedAddress, UnmatchedAddress, REFERENCE_CSV_COLUMNS,
};
use anyhow::{Context, Result};
use csv::{Reader, Writer, WriterBuilder};
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

pub const NOT_FOUND_HEADER: [&str; 5] = ["uid", "apd_original", "apd", "pc", "uprn"];

fn found_header() -> Vec<String> {
    REFERENCE_CSV_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(["uid".to_string(), "original_apd".to_string(), "uprn".to_string()])
        .collect()
}

fn open_append(path: &Path) -> Result<(Writer<File>, bool)> {
    let existed = path.exists() && path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open CSV at {path:?}"))?;
    Ok((WriterBuilder::new().has_headers(false).from_writer(file), existed))
}

pub struct MatchCsvSink {
    found: Writer<File>,
    not_found: Writer<File>,
    found_header_written: bool,
}

impl MatchCsvSink {
    pub fn open(found_path: &Path, not_found_path: &Path) -> Result<Self> {
        let (found, found_existed) = open_append(found_path)?;
        let (mut not_found, not_found_existed) = open_append(not_found_path)?;
        if !not_found_existed {
            not_found.write_record(NOT_FOUND_HEADER)?;
        }
        Ok(Self {
            found,
            not_found,
            found_header_written: found_existed,
        })
    }

    pub fn write_found(&mut self, matched: &MatchedAddress) -> Result<()> {
        if !self.found_header_written {
            self.found.write_record(found_header())?;
            self.found_header_written = true;
        }
        let mut record = matched.address.csv_fields();
        record.push(matched.uid.clone());
        record.push(matched.original_apd.clone());
        record.push(matched.uprn.clone());
        self.found.write_record(record)?;
        Ok(())
    }

    pub fn write_not_found(&mut self, unmatched: &UnmatchedAddress) -> Result<()> {
        self.not_found.write_record([
            unmatched.uid.as_str(),
            unmatched.apd_original.as_str(),
            unmatched.apd.as_str(),
            unmatched.pc.as_str(),
            unmatched.uprn.as_str(),
        ])?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.found.flush()?;
        self.not_found.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct DedupeStats {
    pub moved: usize,
    pub remaining_not_found: usize,
}

/// Absorb duplicate UIDs after the whole run: a uid that appears in both
/// outputs (different source documents for the same property) moves its
/// not-found rows into found, copying the matched row and substituting the
/// unmatched address string into `original_apd`.
pub fn post_process_duplicate_uids(
    found_path: &Path,
    not_found_path: &Path,
) -> Result<DedupeStats> {
    if !found_path.exists() || !not_found_path.exists() {
        tracing::warn!(
            found = ?found_path,
            not_found = ?not_found_path,
            "[Matcher] Skipping duplicate-uid pass, outputs missing"
        );
        return Ok(DedupeStats::default());
    }

    let mut found_reader = Reader::from_path(found_path)?;
    let found_headers = found_reader.headers()?.clone();
    let uid_idx = found_headers
        .iter()
        .position(|h| h == "uid")
        .context("'uid' column not found in found addresses CSV")?;
    let original_apd_idx = found_headers.iter().position(|h| h == "original_apd");

    let mut uid_to_found: std::collections::HashMap<String, csv::StringRecord> =
        std::collections::HashMap::new();
    for record in found_reader.records() {
        let record = record?;
        if let Some(uid) = record.get(uid_idx) {
            uid_to_found.entry(uid.to_string()).or_insert(record);
        }
    }

    let mut not_found_reader = Reader::from_path(not_found_path)?;
    let not_found_headers = not_found_reader.headers()?.clone();
    let nf_uid_idx = not_found_headers
        .iter()
        .position(|h| h == "uid")
        .context("'uid' column not found in not-found CSV")?;
    let nf_apd_original_idx = not_found_headers.iter().position(|h| h == "apd_original");

    let mut remaining: Vec<csv::StringRecord> = vec![];
    let mut to_move: Vec<Vec<String>> = vec![];
    for record in not_found_reader.records() {
        let record = record?;
        let uid = record.get(nf_uid_idx).unwrap_or_default();
        match uid_to_found.get(uid) {
            Some(matched) => {
                let mut row: Vec<String> =
                    matched.iter().map(|field| field.to_string()).collect();
                if let (Some(target), Some(source)) = (original_apd_idx, nf_apd_original_idx) {
                    if let Some(value) = record.get(source) {
                        row[target] = value.to_string();
                    }
                }
                to_move.push(row);
            },
            None => remaining.push(record),
        }
    }

    if to_move.is_empty() {
        return Ok(DedupeStats {
            moved: 0,
            remaining_not_found: remaining.len(),
        });
    }

    let moved = to_move.len();
    let mut found_appender = WriterBuilder::new()
        .has_headers(false)
        .from_writer(OpenOptions::new().append(true).open(found_path)?);
    for row in to_move {
        found_appender.write_record(row)?;
    }
    found_appender.flush()?;

    // Rewrite not-found without the moved rows.
    let tmp_path: PathBuf = not_found_path.with_extension("csv.tmp");
    {
        let mut writer = Writer::from_path(&tmp_path)?;
        writer.write_record(&not_found_headers)?;
        for record in &remaining {
            writer.write_record(record)?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp_path, not_found_path)?;

    Ok(DedupeStats {
        moved,
        remaining_not_found: remaining.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::address_models::reference_address::ReferenceAddress;
    use tempfile::tempdir;

    fn reference_row(id: i64, uprn: i64) -> ReferenceAddress {
        ReferenceAddress {
            id,
            uprn: Some(uprn),
            os_address_toid: None,
            udprn: Some(12345),
            organisation_name: None,
            department_name: None,
            po_box_number: None,
            sub_building_name: None,
            building_name: None,
            building_number: Some("7".to_string()),
            dependent_thoroughfare: None,
            thoroughfare: Some("AGNES STREET".to_string()),
            post_town: Some("LONDON".to_string()),
            double_dependent_locality: None,
            dependent_locality: None,
            postcode: Some("E14 7DG".to_string()),
            postcode_type: Some("S".to_string()),
            x_coordinate: Some(537000.0),
            y_coordinate: Some(180000.0),
            latitude: Some(51.51),
            longitude: Some(-0.02),
            rpc: Some(1),
            country: Some("E".to_string()),
            change_type: Some("I".to_string()),
            la_start_date: None,
            rm_start_date: None,
            last_update_date: None,
            class: Some("RD".to_string()),
        }
    }

    fn matched(uid: &str, apd: &str) -> MatchedAddress {
        MatchedAddress {
            address: reference_row(1, 100),
            uid: uid.to_string(),
            original_apd: apd.to_string(),
            uprn: String::new(),
            match_priority: Some(1),
        }
    }

    fn unmatched(uid: &str, apd: &str) -> UnmatchedAddress {
        UnmatchedAddress {
            uid: uid.to_string(),
            apd_original: apd.to_string(),
            apd: apd.to_string(),
            pc: "E14 7DG".to_string(),
            uprn: String::new(),
        }
    }

    #[test]
    fn writes_headers_once_across_reopens() {
        let dir = tempdir().unwrap();
        let found = dir.path().join("found_addresses.csv");
        let not_found = dir.path().join("not_found.csv");

        {
            let mut sink = MatchCsvSink::open(&found, &not_found).unwrap();
            sink.write_found(&matched("uid-1", "7 AGNES STREET")).unwrap();
            sink.write_not_found(&unmatched("uid-2", "9 NOWHERE LANE")).unwrap();
            sink.flush().unwrap();
        }
        {
            let mut sink = MatchCsvSink::open(&found, &not_found).unwrap();
            sink.write_found(&matched("uid-3", "7 AGNES STREET")).unwrap();
            sink.flush().unwrap();
        }

        let mut reader = Reader::from_path(&found).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.get(0), Some("id"));
        assert_eq!(headers.get(headers.len() - 3), Some("uid"));
        assert_eq!(headers.get(headers.len() - 2), Some("original_apd"));
        assert_eq!(headers.get(headers.len() - 1), Some("uprn"));
        let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);

        let mut nf_reader = Reader::from_path(&not_found).unwrap();
        assert_eq!(
            nf_reader.headers().unwrap().iter().collect::<Vec<_>>(),
            NOT_FOUND_HEADER.to_vec()
        );
    }

    #[test]
    fn duplicate_uids_move_to_found() {
        let dir = tempdir().unwrap();
        let found = dir.path().join("found_addresses.csv");
        let not_found = dir.path().join("not_found.csv");

        {
            let mut sink = MatchCsvSink::open(&found, &not_found).unwrap();
            sink.write_found(&matched("uid-1", "7 AGNES STREET")).unwrap();
            sink.write_not_found(&unmatched("uid-1", "7A AGNES ST")).unwrap();
            sink.write_not_found(&unmatched("uid-9", "9 NOWHERE LANE")).unwrap();
            sink.flush().unwrap();
        }

        let stats = post_process_duplicate_uids(&found, &not_found).unwrap();
        assert_eq!(stats, DedupeStats { moved: 1, remaining_not_found: 1 });

        let mut found_reader = Reader::from_path(&found).unwrap();
        let headers = found_reader.headers().unwrap().clone();
        let apd_idx = headers.iter().position(|h| h == "original_apd").unwrap();
        let rows: Vec<_> = found_reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        // The moved row carries the unmatched document's address string.
        assert_eq!(rows[1].get(apd_idx), Some("7A AGNES ST"));

        let mut nf_reader = Reader::from_path(&not_found).unwrap();
        let nf_rows: Vec<_> = nf_reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(nf_rows.len(), 1);
        assert_eq!(nf_rows[0].get(0), Some("uid-9"));
    }

    #[test]
    fn dedupe_with_no_duplicates_is_a_noop() {
        let dir = tempdir().unwrap();
        let found = dir.path().join("found_addresses.csv");
        let not_found = dir.path().join("not_found.csv");

        {
            let mut sink = MatchCsvSink::open(&found, &not_found).unwrap();
            sink.write_found(&matched("uid-1", "7 AGNES STREET")).unwrap();
            sink.write_not_found(&unmatched("uid-2", "9 NOWHERE LANE")).unwrap();
            sink.flush().unwrap();
        }

        let stats = post_process_duplicate_uids(&found, &not_found).unwrap();
        assert_eq!(stats, DedupeStats { moved: 0, remaining_not_found: 1 });
    }
}
