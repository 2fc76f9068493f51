// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Bulk geocoding through postcodes.io, with a process-scoped cache.
//!
//! The API accepts at most 100 postcodes per request; a short pause between
//! requests keeps within its informal rate cap. Failed requests yield `None`
//! for every postcode in that request so the caller can skip and move on.
//! Negative lookups are cached too, so a bad postcode is asked once per run.

use crate::utils::counters::POSTCODE_LOOKUP_COUNT;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};
use tracing::{info, warn};

pub const POSTCODES_IO_URL: &str = "https://api.postcodes.io/postcodes";
/// Hard API limit per bulk request.
pub const POSTCODES_IO_BATCH_SIZE: usize = 100;
/// Pause between bulk requests.
pub const POSTCODES_IO_PAUSE: Duration = Duration::from_millis(50);
/// Request timeout; a timed-out request negative-caches its batch for the
/// rest of the run only (the cache file never stores them).
pub const POSTCODES_IO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Geocode {
    pub latitude: f64,
    pub longitude: f64,
    pub eastings: Option<i64>,
    pub northings: Option<i64>,
}

#[derive(Debug, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> String {
        let total = self.hits + self.misses;
        if total == 0 {
            return "0.0%".to_string();
        }
        format!("{:.1}%", 100.0 * self.hits as f64 / total as f64)
    }
}

/// Postcode -> geocode cache. Keys are normalized (uppercased, spaces
/// stripped); `None` values are negative cache entries.
#[derive(Debug, Default)]
pub struct PostcodeCache {
    cache: HashMap<String, Option<Geocode>>,
    hits: u64,
    misses: u64,
}

fn normalize_key(postcode: &str) -> String {
    postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

impl PostcodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a previously persisted cache; a missing file is an empty cache.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<HashMap<String, Option<Geocode>>>(&contents)
            {
                Ok(cache) => {
                    info!(entries = cache.len(), "[Enricher] Loaded postcode cache");
                    Self {
                        cache,
                        ..Self::default()
                    }
                },
                Err(e) => {
                    warn!(error = ?e, "[Enricher] Corrupt postcode cache, starting empty");
                    Self::default()
                },
            },
            Err(_) => Self::default(),
        }
    }

    /// Best-effort persistence as a JSON object.
    pub fn save(&self, path: &Path) {
        match serde_json::to_string(&self.cache) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!(error = ?e, "[Enricher] Failed to persist postcode cache");
                }
            },
            Err(e) => warn!(error = ?e, "[Enricher] Failed to serialize postcode cache"),
        }
    }

    pub fn get(&mut self, postcode: &str) -> Option<Option<Geocode>> {
        match self.cache.get(&normalize_key(postcode)) {
            Some(value) => {
                self.hits += 1;
                Some(value.clone())
            },
            None => {
                self.misses += 1;
                None
            },
        }
    }

    pub fn set(&mut self, postcode: &str, value: Option<Geocode>) {
        self.cache.insert(normalize_key(postcode), value);
    }

    pub fn contains(&self, postcode: &str) -> bool {
        self.cache.contains_key(&normalize_key(postcode))
    }

    /// The subset of `postcodes` not yet cached, in input order.
    pub fn get_uncached(&self, postcodes: &[String]) -> Vec<String> {
        postcodes
            .iter()
            .filter(|pc| !self.contains(pc))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.cache.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

#[derive(Deserialize)]
struct BulkResponse {
    result: Option<Vec<BulkResponseEntry>>,
}

#[derive(Deserialize)]
struct BulkResponseEntry {
    query: String,
    result: Option<BulkResponseGeocode>,
}

#[derive(Deserialize)]
struct BulkResponseGeocode {
    latitude: Option<f64>,
    longitude: Option<f64>,
    eastings: Option<i64>,
    northings: Option<i64>,
}

/// Decode one bulk response body into per-query geocodes. Entries without
/// coordinates become negative results.
pub fn parse_bulk_response(body: &str) -> Option<HashMap<String, Option<Geocode>>> {
    let response: BulkResponse = serde_json::from_str(body).ok()?;
    let mut results = HashMap::new();
    for entry in response.result? {
        let geocode = entry.result.and_then(|r| match (r.latitude, r.longitude) {
            (Some(latitude), Some(longitude)) => Some(Geocode {
                latitude,
                longitude,
                eastings: r.eastings,
                northings: r.northings,
            }),
            _ => None,
        });
        results.insert(entry.query, geocode);
    }
    Some(results)
}

/// Look up one batch (at most [`POSTCODES_IO_BATCH_SIZE`]) of postcodes.
/// Any request-level failure returns `None` for every requested postcode.
pub async fn bulk_lookup_postcodes(
    client: &reqwest::Client,
    postcodes: &[String],
) -> HashMap<String, Option<Geocode>> {
    if postcodes.is_empty() {
        return HashMap::new();
    }
    let batch = &postcodes[..postcodes.len().min(POSTCODES_IO_BATCH_SIZE)];

    let response = client
        .post(POSTCODES_IO_URL)
        .json(&serde_json::json!({ "postcodes": batch }))
        .send()
        .await;

    let body = match response {
        Ok(response) => match response.error_for_status() {
            Ok(response) => response.text().await.ok(),
            Err(e) => {
                warn!(error = ?e, "[Enricher] postcodes.io returned an error status");
                None
            },
        },
        Err(e) => {
            warn!(error = ?e, "[Enricher] postcodes.io request failed");
            None
        },
    };

    match body.as_deref().and_then(parse_bulk_response) {
        Some(mut results) => {
            // Postcodes the service did not echo back are negatives.
            for pc in batch {
                results.entry(pc.clone()).or_insert(None);
            }
            results
        },
        None => batch.iter().map(|pc| (pc.clone(), None)).collect(),
    }
}

/// Geocode a set of postcodes, cache first, then the API in batches with the
/// rate-cap pause. All results (including negatives) end up cached.
pub async fn geocode_postcodes_batch(
    client: &reqwest::Client,
    postcodes: &[String],
    cache: &mut PostcodeCache,
) -> HashMap<String, Option<Geocode>> {
    let mut results = HashMap::new();
    let mut wanted = vec![];
    for pc in postcodes {
        if pc.trim().is_empty() {
            continue;
        }
        match cache.get(pc) {
            Some(cached) => {
                POSTCODE_LOOKUP_COUNT.with_label_values(&["hit"]).inc();
                results.insert(pc.clone(), cached);
            },
            None => wanted.push(pc.clone()),
        }
    }

    let uncached = cache.get_uncached(&wanted);
    for (i, chunk) in uncached.chunks(POSTCODES_IO_BATCH_SIZE).enumerate() {
        if i > 0 {
            tokio::time::sleep(POSTCODES_IO_PAUSE).await;
        }
        let fetched = bulk_lookup_postcodes(client, chunk).await;
        for (pc, geocode) in fetched {
            let label = if geocode.is_some() { "miss" } else { "negative" };
            POSTCODE_LOOKUP_COUNT.with_label_values(&[label]).inc();
            cache.set(&pc, geocode.clone());
            results.insert(pc, geocode);
        }
    }
    results
}

/// HTTP client configured for the postcode service.
pub fn postcode_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(POSTCODES_IO_TIMEOUT)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn geocode(lat: f64, lon: f64) -> Geocode {
        Geocode {
            latitude: lat,
            longitude: lon,
            eastings: Some(530047),
            northings: Some(179951),
        }
    }

    #[test]
    fn cache_set_and_get() {
        let mut cache = PostcodeCache::new();
        cache.set("SW1A 1AA", Some(geocode(51.5, -0.14)));
        assert_eq!(cache.get("SW1A 1AA").unwrap().unwrap().latitude, 51.5);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn cache_keys_are_normalized() {
        let mut cache = PostcodeCache::new();
        cache.set("SW1A 1AA", Some(geocode(51.5, -0.14)));
        assert!(cache.get("sw1a 1aa").is_some());
        assert!(cache.get("SW1A1AA").is_some());
        assert!(cache.get("  sw1a1aa  ").is_some());
    }

    #[test]
    fn cache_miss_is_counted() {
        let mut cache = PostcodeCache::new();
        assert!(cache.get("NOTCACHED").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn negative_entries_are_cached() {
        let mut cache = PostcodeCache::new();
        cache.set("INVALID", None);
        assert!(cache.contains("INVALID"));
        assert_eq!(cache.get("INVALID"), Some(None));
    }

    #[test]
    fn uncached_subset() {
        let mut cache = PostcodeCache::new();
        cache.set("SW1A 1AA", Some(geocode(51.5, -0.14)));
        cache.set("M1 1AA", Some(geocode(53.5, -2.2)));
        let postcodes: Vec<String> = ["SW1A 1AA", "B1 1AA", "M1 1AA", "LS1 1AA"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(cache.get_uncached(&postcodes), vec!["B1 1AA", "LS1 1AA"]);
    }

    #[test]
    fn hit_rate_formatting() {
        let mut cache = PostcodeCache::new();
        cache.set("SW1A 1AA", Some(geocode(51.5, -0.14)));
        cache.get("SW1A 1AA");
        cache.get("SW1A 1AA");
        cache.get("SW1A 1AA");
        cache.get("NOTCACHED");
        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), "75.0%");
    }

    #[test]
    fn cache_round_trips_through_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("postcode_cache.json");
        let mut cache = PostcodeCache::new();
        cache.set("SW1A 1AA", Some(geocode(51.501009, -0.141588)));
        cache.set("ZZ99 9ZZ", None);
        cache.save(&path);

        let mut reloaded = PostcodeCache::load(&path);
        assert_eq!(
            reloaded.get("SW1A1AA").unwrap().unwrap().latitude,
            51.501009
        );
        assert_eq!(reloaded.get("ZZ99 9ZZ"), Some(None));
    }

    #[test]
    fn parses_bulk_response_with_hits_and_misses() {
        let body = r#"{
            "status": 200,
            "result": [
                {
                    "query": "SW1A 1AA",
                    "result": {
                        "latitude": 51.501009,
                        "longitude": -0.141588,
                        "eastings": 529090,
                        "northings": 179645,
                        "region": "London",
                        "admin_district": "Westminster"
                    }
                },
                {"query": "ZZ99 9ZZ", "result": null}
            ]
        }"#;
        let results = parse_bulk_response(body).unwrap();
        assert_eq!(results.len(), 2);
        let hit = results["SW1A 1AA"].as_ref().unwrap();
        assert_eq!(hit.latitude, 51.501009);
        assert_eq!(hit.eastings, Some(529090));
        assert_eq!(results["ZZ99 9ZZ"], None);
    }

    #[test]
    fn malformed_response_is_rejected() {
        assert!(parse_bulk_response("not json").is_none());
        assert!(parse_bulk_response(r#"{"status": 500}"#).is_none());
    }
}
