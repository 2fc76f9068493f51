// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Tiered batch lookup against the national address reference.
//!
//! Tier order per record: UPRN exact, then a single ranked query per subset
//! (postcode-bearing, town-bearing) that joins a temporary lookup table to
//! `ab_plus` and keeps the minimum-priority row per lookup key:
//!   1 = exact building_number, 2 = exact building_name,
//!   3 = fuzzy building_number by base number, 4 = fuzzy building_name.
//! All comparisons are case-folded in the store. Lookup batches are loaded
//! through UNNEST array binds; temp tables are session-scoped and truncated
//! between batches.

use crate::{
    matching::address_parser::extract_base_number,
    models::address_models::reference_address::{
        MatchCandidate, MatchedAddress, ReferenceAddress, UnmatchedAddress,
    },
    utils::database::{tune_matching_session, MyDbConnection, PgDbPool},
};
use anyhow::{Context, Result};
use diesel::sql_types::{Array, BigInt, Integer, Nullable, Text};
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, RunQueryDsl};
use itertools::Itertools;
use std::collections::HashMap;

/// Tuples per UNNEST insert into the temp lookup tables.
const LOOKUP_INSERT_CHUNK: usize = 5000;

#[derive(QueryableByName)]
struct UprnMatchRow {
    #[diesel(sql_type = BigInt)]
    lookup_uprn: i64,
    #[diesel(embed)]
    address: ReferenceAddress,
}

#[derive(QueryableByName)]
struct RankedMatchRow {
    #[diesel(sql_type = Text)]
    lookup_house_number: String,
    #[diesel(sql_type = Text)]
    lookup_road: String,
    #[diesel(sql_type = Text)]
    lookup_key: String,
    #[diesel(sql_type = Nullable<Integer>)]
    match_priority: Option<i32>,
    #[diesel(embed)]
    address: ReferenceAddress,
}

pub struct AddressMatcher {
    pool: PgDbPool,
}

impl AddressMatcher {
    pub fn new(pool: PgDbPool) -> Self {
        Self { pool }
    }

    /// Create the lookup indexes if missing. Run once before the first
    /// batch; harmless on re-runs.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let conn = &mut *conn;
        let statements = [
            "CREATE INDEX IF NOT EXISTS idx_ab_plus_building_number_lookup \
             ON ab_plus (UPPER(building_number), UPPER(thoroughfare), UPPER(postcode))",
            "CREATE INDEX IF NOT EXISTS idx_ab_plus_building_name_lookup \
             ON ab_plus (UPPER(building_name), UPPER(thoroughfare), UPPER(postcode))",
            "CREATE INDEX IF NOT EXISTS idx_ab_plus_uprn ON ab_plus (uprn)",
            "CREATE INDEX IF NOT EXISTS idx_ab_plus_building_number_city_lookup \
             ON ab_plus (UPPER(building_number), UPPER(thoroughfare), UPPER(post_town))",
            "CREATE INDEX IF NOT EXISTS idx_ab_plus_building_name_city_lookup \
             ON ab_plus (UPPER(building_name), UPPER(thoroughfare), UPPER(post_town))",
            "CREATE INDEX IF NOT EXISTS idx_ab_plus_postcode_road \
             ON ab_plus (UPPER(postcode), UPPER(thoroughfare))",
        ];
        for statement in statements {
            diesel::sql_query(statement)
                .execute(conn)
                .await
                .with_context(|| format!("Failed to ensure index: {statement}"))?;
        }
        tracing::info!("[Matcher] Reference store indexes verified");
        Ok(())
    }

    /// Run the tiered lookup for one batch of candidates. Store errors roll
    /// the batch's transaction back and propagate; the caller re-processes
    /// from its last checkpoint.
    pub async fn match_batch(
        &self,
        candidates: Vec<MatchCandidate>,
    ) -> Result<(Vec<MatchedAddress>, Vec<UnmatchedAddress>)> {
        if candidates.is_empty() {
            return Ok((vec![], vec![]));
        }
        let mut conn = self.pool.get().await?;
        let conn = &mut *conn;
        let result = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    tune_matching_session(conn).await?;
                    match_batch_in_txn(conn, candidates).await
                }
                .scope_boxed()
            })
            .await
            .context("Address lookup batch failed")?;
        Ok(result)
    }
}

async fn match_batch_in_txn(
    conn: &mut MyDbConnection,
    candidates: Vec<MatchCandidate>,
) -> Result<(Vec<MatchedAddress>, Vec<UnmatchedAddress>), diesel::result::Error> {
    let mut found = vec![];

    // Tier 1: UPRN exact for records carrying a hint.
    let (uprn_candidates, mut remaining): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|c| parse_uprn(&c.uprn).is_some());
    if !uprn_candidates.is_empty() {
        let (uprn_found, uprn_missed) = lookup_by_uprn(conn, uprn_candidates).await?;
        found.extend(uprn_found);
        remaining.extend(uprn_missed);
    }

    // Tiers 2-5: split by available geography.
    let (postcode_candidates, rest): (Vec<_>, Vec<_>) =
        remaining.into_iter().partition(|c| !c.pc.is_empty());
    let (city_candidates, hopeless): (Vec<_>, Vec<_>) =
        rest.into_iter().partition(|c| c.city.is_some());

    let mut not_found: Vec<UnmatchedAddress> = hopeless.iter().map(|c| c.unmatched()).collect();

    if !postcode_candidates.is_empty() {
        let (pc_found, pc_missed) = lookup_ranked(conn, postcode_candidates, RankedTier::Postcode).await?;
        found.extend(pc_found);
        not_found.extend(pc_missed);
    }
    if !city_candidates.is_empty() {
        let (city_found, city_missed) = lookup_ranked(conn, city_candidates, RankedTier::PostTown).await?;
        found.extend(city_found);
        not_found.extend(city_missed);
    }

    Ok((found, not_found))
}

fn parse_uprn(uprn: &str) -> Option<i64> {
    let trimmed = uprn.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<i64>().ok()
}

async fn lookup_by_uprn(
    conn: &mut MyDbConnection,
    candidates: Vec<MatchCandidate>,
) -> Result<(Vec<MatchedAddress>, Vec<MatchCandidate>), diesel::result::Error> {
    diesel::sql_query(
        "CREATE TEMP TABLE IF NOT EXISTS lookup_batch_uprn (uprn BIGINT) ON COMMIT DELETE ROWS",
    )
    .execute(conn)
    .await?;
    diesel::sql_query("TRUNCATE lookup_batch_uprn")
        .execute(conn)
        .await?;

    let unique_uprns: Vec<i64> = candidates
        .iter()
        .filter_map(|c| parse_uprn(&c.uprn))
        .unique()
        .collect();
    for chunk in unique_uprns.chunks(LOOKUP_INSERT_CHUNK) {
        diesel::sql_query("INSERT INTO lookup_batch_uprn (uprn) SELECT * FROM UNNEST($1::bigint[])")
            .bind::<Array<BigInt>, _>(chunk.to_vec())
            .execute(conn)
            .await?;
    }

    let rows: Vec<UprnMatchRow> = diesel::sql_query(
        "SELECT DISTINCT ON (lb.uprn) lb.uprn AS lookup_uprn, ab.* \
         FROM lookup_batch_uprn lb \
         JOIN ab_plus ab ON ab.uprn = lb.uprn \
         ORDER BY lb.uprn, ab.id",
    )
    .load(conn)
    .await?;

    let by_uprn: HashMap<i64, ReferenceAddress> =
        rows.into_iter().map(|r| (r.lookup_uprn, r.address)).collect();

    let mut found = vec![];
    let mut missed = vec![];
    for candidate in candidates {
        match parse_uprn(&candidate.uprn).and_then(|u| by_uprn.get(&u)) {
            Some(address) => found.push(MatchedAddress {
                address: address.clone(),
                uid: candidate.uid,
                original_apd: candidate.apd,
                uprn: candidate.uprn,
                match_priority: None,
            }),
            None => missed.push(candidate),
        }
    }
    Ok((found, missed))
}

#[derive(Clone, Copy)]
enum RankedTier {
    Postcode,
    PostTown,
}

impl RankedTier {
    fn temp_table(&self) -> &'static str {
        match self {
            RankedTier::Postcode => "lookup_batch_pc",
            RankedTier::PostTown => "lookup_batch_city",
        }
    }

    fn reference_column(&self) -> &'static str {
        match self {
            RankedTier::Postcode => "postcode",
            RankedTier::PostTown => "post_town",
        }
    }

    fn candidate_key(&self, candidate: &MatchCandidate) -> String {
        match self {
            RankedTier::Postcode => candidate.pc.clone(),
            RankedTier::PostTown => candidate.city.clone().unwrap_or_default(),
        }
    }
}

/// The single combined query for tiers 2-5: exact number, exact name, fuzzy
/// number, fuzzy name, with the store keeping the best-priority row per
/// lookup key.
async fn lookup_ranked(
    conn: &mut MyDbConnection,
    candidates: Vec<MatchCandidate>,
    tier: RankedTier,
) -> Result<(Vec<MatchedAddress>, Vec<UnmatchedAddress>), diesel::result::Error> {
    let temp_table = tier.temp_table();
    diesel::sql_query(format!(
        "CREATE TEMP TABLE IF NOT EXISTS {temp_table} (\
             house_number TEXT, base_number TEXT, road TEXT, lookup_key TEXT\
         ) ON COMMIT DELETE ROWS"
    ))
    .execute(conn)
    .await?;
    diesel::sql_query(format!("TRUNCATE {temp_table}"))
        .execute(conn)
        .await?;

    let unique_lookups: Vec<(String, String, String)> = candidates
        .iter()
        .map(|c| (c.house_number.clone(), c.road.clone(), tier.candidate_key(c)))
        .unique()
        .collect();

    for chunk in unique_lookups.chunks(LOOKUP_INSERT_CHUNK) {
        let house_numbers: Vec<String> = chunk.iter().map(|(h, _, _)| h.clone()).collect();
        let base_numbers: Vec<String> =
            chunk.iter().map(|(h, _, _)| extract_base_number(h)).collect();
        let roads: Vec<String> = chunk.iter().map(|(_, r, _)| r.clone()).collect();
        let keys: Vec<String> = chunk.iter().map(|(_, _, k)| k.clone()).collect();
        diesel::sql_query(format!(
            "INSERT INTO {temp_table} (house_number, base_number, road, lookup_key) \
             SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[])"
        ))
        .bind::<Array<Text>, _>(house_numbers)
        .bind::<Array<Text>, _>(base_numbers)
        .bind::<Array<Text>, _>(roads)
        .bind::<Array<Text>, _>(keys)
        .execute(conn)
        .await?;
    }

    let reference_column = tier.reference_column();
    let rows: Vec<RankedMatchRow> = diesel::sql_query(format!(
        "WITH ranked_matches AS (\
             SELECT \
                 lb.house_number AS lookup_house_number, \
                 lb.road AS lookup_road, \
                 lb.lookup_key AS lookup_key, \
                 ab.*, \
                 CASE \
                     WHEN UPPER(ab.building_number) = UPPER(lb.house_number) THEN 1 \
                     WHEN UPPER(ab.building_name) = UPPER(lb.house_number) THEN 2 \
                     WHEN UPPER(ab.building_number) = UPPER(lb.base_number) \
                          OR UPPER(ab.building_number) LIKE UPPER(lb.base_number) || '%' THEN 3 \
                     WHEN UPPER(ab.building_name) = UPPER(lb.base_number) \
                          OR UPPER(ab.building_name) LIKE UPPER(lb.base_number) || '%' THEN 4 \
                 END AS match_priority \
             FROM {temp_table} lb \
             JOIN ab_plus ab ON \
                 UPPER(ab.thoroughfare) = UPPER(lb.road) AND \
                 UPPER(ab.{reference_column}) = UPPER(lb.lookup_key) AND \
                 (\
                     UPPER(ab.building_number) = UPPER(lb.house_number) OR \
                     UPPER(ab.building_name) = UPPER(lb.house_number) OR \
                     UPPER(ab.building_number) = UPPER(lb.base_number) OR \
                     UPPER(ab.building_number) LIKE UPPER(lb.base_number) || '%' OR \
                     UPPER(ab.building_name) = UPPER(lb.base_number) OR \
                     UPPER(ab.building_name) LIKE UPPER(lb.base_number) || '%' \
                 )\
         ) \
         SELECT DISTINCT ON (lookup_house_number, lookup_road, lookup_key) * \
         FROM ranked_matches \
         ORDER BY lookup_house_number, lookup_road, lookup_key, match_priority"
    ))
    .load(conn)
    .await?;

    let by_key: HashMap<(String, String, String), RankedMatchRow> = rows
        .into_iter()
        .map(|r| {
            (
                (r.lookup_house_number.clone(), r.lookup_road.clone(), r.lookup_key.clone()),
                r,
            )
        })
        .collect();

    let mut found = vec![];
    let mut missed = vec![];
    for candidate in candidates {
        let key = (
            candidate.house_number.clone(),
            candidate.road.clone(),
            tier.candidate_key(&candidate),
        );
        match by_key.get(&key) {
            Some(row) => found.push(MatchedAddress {
                address: row.address.clone(),
                uid: candidate.uid,
                original_apd: candidate.apd,
                uprn: candidate.uprn,
                match_priority: row.match_priority,
            }),
            None => missed.push(candidate.unmatched()),
        }
    }
    Ok((found, missed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uprn_hints_must_be_positive_digit_runs() {
        assert_eq!(parse_uprn("100023336956"), Some(100023336956));
        assert_eq!(parse_uprn(" 42 "), Some(42));
        assert_eq!(parse_uprn(""), None);
        assert_eq!(parse_uprn("n/a"), None);
        assert_eq!(parse_uprn("12AB"), None);
    }

    #[test]
    fn ranked_tier_keys() {
        let candidate = MatchCandidate {
            uid: "u".to_string(),
            apd_original: "a".to_string(),
            apd: "a".to_string(),
            pc: "E14 7DG".to_string(),
            city: Some("LONDON".to_string()),
            house_number: "7".to_string(),
            road: "AGNES STREET".to_string(),
            uprn: String::new(),
        };
        assert_eq!(RankedTier::Postcode.candidate_key(&candidate), "E14 7DG");
        assert_eq!(RankedTier::PostTown.candidate_key(&candidate), "LONDON");
        assert_eq!(RankedTier::Postcode.temp_table(), "lookup_batch_pc");
        assert_eq!(RankedTier::PostTown.reference_column(), "post_town");
    }
}
