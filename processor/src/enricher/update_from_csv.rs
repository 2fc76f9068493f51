// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Applies the matcher's CSV outputs back to the document store.
//!
//! Matched rows: residential properties (class R/X/P) get the reference
//! address fields and a GeoJSON point; anything else is deleted. Unmatched
//! rows that still carry a postcode get coordinates from the postcode
//! service. All writes are unordered bulk operations keyed on `uid`.

use crate::enricher::postcodes::{
    geocode_postcodes_batch, postcode_client, Geocode, PostcodeCache,
};
use anyhow::{Context, Result};
use mongodb::{
    bson::{doc, Bson, Document},
    options::{DeleteOneModel, IndexOptions, UpdateOneModel, WriteModel},
    Client, IndexModel, Namespace,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

/// First character of `class` marking a residential property.
pub const RESIDENTIAL_CLASSES: [char; 3] = ['R', 'X', 'P'];
/// GeoJSON point field on the documents.
pub const LOCATION_FIELD: &str = "location";
/// Cache is flushed to disk every this many processed not-found rows.
const CACHE_FLUSH_INTERVAL: usize = 100_000;

/// CSV column -> document field for the residential update.
pub const ADDRESS_FIELD_MAPPING: [(&str, &str); 12] = [
    ("uprn", "ab_uprn"),
    ("udprn", "udprn"),
    ("building_name", "building_name"),
    ("building_number", "building_number"),
    ("thoroughfare", "thoroughfare"),
    ("post_town", "post_town"),
    ("postcode", "ab_postcode"),
    ("x_coordinate", "x_coordinate"),
    ("y_coordinate", "y_coordinate"),
    ("latitude", "latitude"),
    ("longitude", "longitude"),
    ("class", "class"),
];

pub fn is_residential(class_value: &str) -> bool {
    class_value
        .trim()
        .chars()
        .next()
        .map(|c| RESIDENTIAL_CLASSES.contains(&c))
        .unwrap_or(false)
}

pub fn geojson_point(longitude: f64, latitude: f64) -> Document {
    doc! {
        "type": "Point",
        "coordinates": [longitude, latitude],
    }
}

fn typed_bson(column: &str, raw: &str) -> Option<Bson> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match column {
        "uprn" | "udprn" => trimmed.parse::<i64>().ok().map(Bson::Int64),
        "x_coordinate" | "y_coordinate" | "latitude" | "longitude" => {
            trimmed.parse::<f64>().ok().map(Bson::Double)
        },
        _ => Some(Bson::String(trimmed.to_string())),
    }
}

/// What one matched-CSV row should do to the document store.
#[derive(Debug, PartialEq)]
pub enum RowAction {
    /// `$set` for a residential property.
    Update(Document),
    /// Non-residential documents are removed.
    Delete,
}

/// Classify one found-addresses row. Returns the uid and the action, or
/// `None` when the row has no uid.
pub fn classify_found_row(
    header_index: &HashMap<String, usize>,
    record: &csv::StringRecord,
) -> Option<(String, RowAction)> {
    let get = |column: &str| {
        header_index
            .get(column)
            .and_then(|idx| record.get(*idx))
            .unwrap_or_default()
    };

    let uid = get("uid").trim().to_string();
    if uid.is_empty() {
        return None;
    }

    if !is_residential(get("class")) {
        return Some((uid, RowAction::Delete));
    }

    let mut update = Document::new();
    for (csv_field, mongo_field) in ADDRESS_FIELD_MAPPING {
        if let Some(value) = typed_bson(csv_field, get(csv_field)) {
            update.insert(mongo_field, value);
        }
    }
    let latitude = get("latitude").trim().parse::<f64>().ok();
    let longitude = get("longitude").trim().parse::<f64>().ok();
    if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
        update.insert(LOCATION_FIELD, geojson_point(longitude, latitude));
    }
    if update.is_empty() {
        return None;
    }
    Some((uid, RowAction::Update(update)))
}

/// `$set` applied to an unmatched document whose postcode geocoded.
pub fn build_geocode_update(geocode: &Geocode) -> Document {
    let mut update = doc! {
        "latitude": geocode.latitude,
        "longitude": geocode.longitude,
        LOCATION_FIELD: geojson_point(geocode.longitude, geocode.latitude),
    };
    if let Some(eastings) = geocode.eastings {
        update.insert("x_coordinate", eastings);
    }
    if let Some(northings) = geocode.northings {
        update.insert("y_coordinate", northings);
    }
    update
}

#[derive(Debug, Default)]
pub struct EnrichStats {
    pub processed: u64,
    pub updates: u64,
    pub deletes: u64,
    pub geocoded: u64,
    pub skipped: u64,
}

pub struct CsvEnricher {
    client: Client,
    namespace: Namespace,
    found_csv: PathBuf,
    not_found_csv: PathBuf,
    cache_path: PathBuf,
    progress_path: PathBuf,
    chunk_size: usize,
}

impl CsvEnricher {
    pub fn new(
        client: Client,
        namespace: Namespace,
        data_dir: &Path,
        chunk_size: usize,
    ) -> Self {
        Self {
            client,
            namespace,
            found_csv: data_dir.join("found_addresses.csv"),
            not_found_csv: data_dir.join("not_found.csv"),
            cache_path: data_dir.join("postcode_cache.json"),
            progress_path: data_dir.join("enrichment_progress.txt"),
            chunk_size,
        }
    }

    fn collection(&self) -> mongodb::Collection<Document> {
        self.client
            .database(&self.namespace.db)
            .collection(&self.namespace.coll)
    }

    /// Geospatial queries need the 2dsphere index; create it if missing.
    pub async fn ensure_2dsphere_index(&self) -> Result<()> {
        let collection = self.collection();
        let index_name = format!("{LOCATION_FIELD}_2dsphere");
        let existing = collection.list_index_names().await.unwrap_or_default();
        if existing.contains(&index_name) {
            info!(index = index_name.as_str(), "[Enricher] 2dsphere index already exists");
            return Ok(());
        }
        info!(index = index_name.as_str(), "[Enricher] Creating 2dsphere index");
        collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { LOCATION_FIELD: "2dsphere" })
                    .options(IndexOptions::builder().name(index_name).build())
                    .build(),
            )
            .await
            .context("Failed to create 2dsphere index")?;
        Ok(())
    }

    async fn flush(&self, operations: Vec<WriteModel>) -> Result<()> {
        if operations.is_empty() {
            return Ok(());
        }
        // Unordered on purpose: operations are independent idempotent sets,
        // and a partial failure must not stall the run.
        if let Err(e) = self.client.bulk_write(operations).ordered(false).await {
            warn!(error = ?e, "[Enricher] Bulk write error (some operations may have succeeded)");
        }
        Ok(())
    }

    fn write_progress(&self, stats: &EnrichStats, total: u64) {
        let contents = format!(
            "processed={}\ntotal={}\nupdates={}\ndeletes={}\n",
            stats.processed, total, stats.updates, stats.deletes
        );
        if let Err(e) = std::fs::write(&self.progress_path, contents) {
            warn!(error = ?e, "[Enricher] Failed to write progress file");
        }
    }

    /// Apply the found-addresses CSV: residential updates, non-residential
    /// deletes.
    pub async fn apply_found(&self) -> Result<EnrichStats> {
        anyhow::ensure!(
            self.found_csv.exists(),
            "Found addresses CSV missing: {:?}",
            self.found_csv
        );
        self.ensure_2dsphere_index().await?;

        let total = count_csv_rows(&self.found_csv)?;
        info!(total = total, csv = ?self.found_csv, "[Enricher] Applying matched rows");

        let mut reader = csv::Reader::from_path(&self.found_csv)?;
        let header_index: HashMap<String, usize> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_string(), idx))
            .collect();
        anyhow::ensure!(
            header_index.contains_key("uid") && header_index.contains_key("class"),
            "Found addresses CSV is missing required columns"
        );

        let mut stats = EnrichStats::default();
        let mut operations: Vec<WriteModel> = vec![];
        for record in reader.records() {
            let record = record?;
            stats.processed += 1;
            if let Some((uid, action)) = classify_found_row(&header_index, &record) {
                match action {
                    RowAction::Update(update) => {
                        stats.updates += 1;
                        operations.push(WriteModel::UpdateOne(
                            UpdateOneModel::builder()
                                .namespace(self.namespace.clone())
                                .filter(doc! { "uid": &uid })
                                .update(doc! { "$set": update })
                                .build(),
                        ));
                    },
                    RowAction::Delete => {
                        stats.deletes += 1;
                        operations.push(WriteModel::DeleteOne(
                            DeleteOneModel::builder()
                                .namespace(self.namespace.clone())
                                .filter(doc! { "uid": &uid })
                                .build(),
                        ));
                    },
                }
            }
            if operations.len() >= self.chunk_size {
                self.flush(std::mem::take(&mut operations)).await?;
                self.write_progress(&stats, total);
            }
        }
        self.flush(operations).await?;
        self.write_progress(&stats, total);
        info!(
            processed = stats.processed,
            updates = stats.updates,
            deletes = stats.deletes,
            "[Enricher] Matched rows applied"
        );
        Ok(stats)
    }

    /// Geocode unmatched-but-postcoded documents through the postcode
    /// service, with the process-scoped cache persisted between runs.
    pub async fn geocode_not_found(&self) -> Result<EnrichStats> {
        anyhow::ensure!(
            self.not_found_csv.exists(),
            "Not-found CSV missing: {:?}",
            self.not_found_csv
        );

        let client = postcode_client()?;
        let mut cache = PostcodeCache::load(&self.cache_path);
        let mut stats = EnrichStats::default();
        let mut rows_since_flush = 0usize;

        let mut reader = csv::Reader::from_path(&self.not_found_csv)?;
        let header_index: HashMap<String, usize> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_string(), idx))
            .collect();
        let uid_idx = *header_index
            .get("uid")
            .context("'uid' column missing from not-found CSV")?;
        let pc_idx = *header_index
            .get("pc")
            .context("'pc' column missing from not-found CSV")?;

        let mut chunk: Vec<(String, String)> = vec![];
        let mut operations: Vec<WriteModel> = vec![];
        let mut records = reader.records();
        loop {
            let record = records.next().transpose()?;
            if let Some(record) = &record {
                stats.processed += 1;
                let uid = record.get(uid_idx).unwrap_or_default().trim().to_string();
                let pc = record.get(pc_idx).unwrap_or_default().trim().to_string();
                if uid.is_empty() || pc.is_empty() {
                    stats.skipped += 1;
                } else {
                    chunk.push((uid, pc));
                }
            }
            let at_end = record.is_none();
            if chunk.len() >= self.chunk_size || (at_end && !chunk.is_empty()) {
                let postcodes: Vec<String> = chunk.iter().map(|(_, pc)| pc.clone()).collect();
                let geocodes = geocode_postcodes_batch(&client, &postcodes, &mut cache).await;
                for (uid, pc) in chunk.drain(..) {
                    match geocodes.get(&pc).cloned().flatten() {
                        Some(geocode) => {
                            stats.geocoded += 1;
                            operations.push(WriteModel::UpdateOne(
                                UpdateOneModel::builder()
                                    .namespace(self.namespace.clone())
                                    .filter(doc! { "uid": &uid })
                                    .update(doc! { "$set": build_geocode_update(&geocode) })
                                    .build(),
                            ));
                        },
                        None => stats.skipped += 1,
                    }
                }
                self.flush(std::mem::take(&mut operations)).await?;

                rows_since_flush += self.chunk_size;
                if rows_since_flush >= CACHE_FLUSH_INTERVAL {
                    cache.save(&self.cache_path);
                    rows_since_flush = 0;
                }
            }
            if at_end {
                break;
            }
        }

        cache.save(&self.cache_path);
        let cache_stats = cache.stats();
        info!(
            processed = stats.processed,
            geocoded = stats.geocoded,
            skipped = stats.skipped,
            cache_size = cache_stats.size,
            cache_hit_rate = cache_stats.hit_rate().as_str(),
            "[Enricher] Not-found geocoding complete"
        );
        Ok(stats)
    }

    /// The full enrichment pass: matched rows first, then postcode-only
    /// geocoding for the rest.
    pub async fn run(&self) -> Result<()> {
        self.apply_found().await?;
        self.geocode_not_found().await?;
        Ok(())
    }
}

fn count_csv_rows(path: &Path) -> Result<u64> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut count = 0u64;
    for record in reader.records() {
        record?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_index(columns: &[&str]) -> HashMap<String, usize> {
        columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.to_string(), idx))
            .collect()
    }

    #[test]
    fn residential_classes() {
        assert!(is_residential("RD"));
        assert!(is_residential("X"));
        assert!(is_residential("P "));
        assert!(is_residential(" R"));
        assert!(!is_residential("CO"));
        assert!(!is_residential(""));
    }

    #[test]
    fn residential_row_becomes_update_with_location() {
        let headers = header_index(&[
            "uid",
            "uprn",
            "udprn",
            "building_number",
            "thoroughfare",
            "post_town",
            "postcode",
            "latitude",
            "longitude",
            "class",
        ]);
        let record = csv::StringRecord::from(vec![
            "doc-1",
            "100023336956",
            "12345",
            "7",
            "AGNES STREET",
            "LONDON",
            "E14 7DG",
            "51.51",
            "-0.02",
            "RD",
        ]);
        let (uid, action) = classify_found_row(&headers, &record).unwrap();
        assert_eq!(uid, "doc-1");
        let update = match action {
            RowAction::Update(update) => update,
            other => panic!("expected update, got {other:?}"),
        };
        assert_eq!(update.get_i64("ab_uprn").unwrap(), 100023336956);
        assert_eq!(update.get_str("ab_postcode").unwrap(), "E14 7DG");
        assert_eq!(update.get_f64("latitude").unwrap(), 51.51);
        let location = update.get_document(LOCATION_FIELD).unwrap();
        assert_eq!(location.get_str("type").unwrap(), "Point");
        let coordinates = location.get_array("coordinates").unwrap();
        // GeoJSON order is [longitude, latitude].
        assert_eq!(coordinates[0].as_f64().unwrap(), -0.02);
        assert_eq!(coordinates[1].as_f64().unwrap(), 51.51);
    }

    #[test]
    fn non_residential_row_becomes_delete() {
        let headers = header_index(&["uid", "class"]);
        let record = csv::StringRecord::from(vec!["doc-2", "CO"]);
        assert_eq!(
            classify_found_row(&headers, &record),
            Some(("doc-2".to_string(), RowAction::Delete))
        );
    }

    #[test]
    fn row_without_uid_is_skipped() {
        let headers = header_index(&["uid", "class"]);
        let record = csv::StringRecord::from(vec!["", "RD"]);
        assert_eq!(classify_found_row(&headers, &record), None);
    }

    #[test]
    fn missing_coordinates_omit_location() {
        let headers = header_index(&["uid", "postcode", "latitude", "longitude", "class"]);
        let record = csv::StringRecord::from(vec!["doc-3", "E14 7DG", "", "", "R"]);
        let (_, action) = classify_found_row(&headers, &record).unwrap();
        let update = match action {
            RowAction::Update(update) => update,
            other => panic!("expected update, got {other:?}"),
        };
        assert!(!update.contains_key(LOCATION_FIELD));
        assert_eq!(update.get_str("ab_postcode").unwrap(), "E14 7DG");
    }

    #[test]
    fn geocode_update_carries_point_and_grid() {
        let geocode = Geocode {
            latitude: 51.501009,
            longitude: -0.141588,
            eastings: Some(529090),
            northings: Some(179645),
        };
        let update = build_geocode_update(&geocode);
        assert_eq!(update.get_f64("latitude").unwrap(), 51.501009);
        assert_eq!(update.get_f64("longitude").unwrap(), -0.141588);
        assert_eq!(update.get_i64("x_coordinate").unwrap(), 529090);
        let location = update.get_document(LOCATION_FIELD).unwrap();
        let coordinates = location.get_array("coordinates").unwrap();
        assert_eq!(coordinates[0].as_f64().unwrap(), -0.141588);
        assert_eq!(coordinates[1].as_f64().unwrap(), 51.501009);
    }
}
