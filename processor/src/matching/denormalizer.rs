// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! One-time denormalization of the address reference, pre-materializing the
//! variants the matcher would otherwise have to resolve per query:
//!
//! - building-number ranges held in `building_name` ("2-6") expand into one
//!   row per number;
//! - thoroughfares containing "ST." gain a dotless "ST" twin.
//!
//! Synthetic rows take strictly negative UPRNs, descending from one below
//! the lowest existing synthetic (or -1). Positive UPRN = original row,
//! negative = synthetic; synthetic rows copy every geographic field of
//! their parent. Both passes are guarded with NOT EXISTS so a re-run
//! inserts nothing.

use crate::utils::database::{execute_with_better_error, PgDbPool};
use anyhow::{Context, Result};
use diesel::sql_types::BigInt;
use diesel_async::RunQueryDsl;
use tracing::info;

#[derive(QueryableByName)]
struct MinUprnRow {
    #[diesel(sql_type = BigInt)]
    min_uprn: i64,
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

pub struct Denormalizer {
    pool: PgDbPool,
}

impl Denormalizer {
    pub fn new(pool: PgDbPool) -> Self {
        Self { pool }
    }

    pub async fn run(&self) -> Result<()> {
        self.expand_building_number_ranges().await?;
        self.expand_thoroughfare_st_variants().await?;
        Ok(())
    }

    async fn next_synthetic_uprn(&self) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let conn = &mut *conn;
        let row: MinUprnRow = diesel::sql_query(
            "SELECT COALESCE(MIN(uprn), 0) AS min_uprn FROM ab_plus WHERE uprn < 0",
        )
        .get_result(conn)
        .await
        .context("Failed to read existing synthetic UPRNs")?;
        Ok(if row.min_uprn < 0 { row.min_uprn - 1 } else { -1 })
    }

    /// Expand `building_name` ranges like "2-6" into one row per number,
    /// `building_name` cleared and `building_number` set.
    pub async fn expand_building_number_ranges(&self) -> Result<()> {
        let start = self.next_synthetic_uprn().await?;
        info!(
            synthetic_uprn_start = start,
            "[Denormalizer] Expanding building number ranges"
        );

        let mut conn = self.pool.get().await?;
        let conn = &mut *conn;
        let candidates: CountRow = diesel::sql_query(
            "SELECT COUNT(*) AS count FROM ab_plus WHERE building_name ~ '^[0-9]+-[0-9]+$'",
        )
        .get_result(conn)
        .await?;
        info!(
            candidates = candidates.count,
            "[Denormalizer] Rows with ranged building names"
        );
        if candidates.count == 0 {
            return Ok(());
        }

        let inserted = diesel::sql_query(
            "INSERT INTO ab_plus (\
                 uprn, os_address_toid, udprn, organisation_name, department_name, \
                 po_box_number, sub_building_name, building_name, building_number, \
                 dependent_thoroughfare, thoroughfare, post_town, double_dependent_locality, \
                 dependent_locality, postcode, postcode_type, x_coordinate, y_coordinate, \
                 latitude, longitude, rpc, country, change_type, la_start_date, \
                 rm_start_date, last_update_date, class, geom\
             ) \
             SELECT \
                 $1 - ROW_NUMBER() OVER () + 1 AS uprn, \
                 os_address_toid, udprn, organisation_name, department_name, \
                 po_box_number, sub_building_name, NULL AS building_name, \
                 expanded_num::TEXT AS building_number, \
                 dependent_thoroughfare, thoroughfare, post_town, double_dependent_locality, \
                 dependent_locality, postcode, postcode_type, x_coordinate, y_coordinate, \
                 latitude, longitude, rpc, country, change_type, la_start_date, \
                 rm_start_date, last_update_date, class, geom \
             FROM ab_plus, \
             LATERAL generate_series(\
                 SPLIT_PART(building_name, '-', 1)::INTEGER, \
                 SPLIT_PART(building_name, '-', 2)::INTEGER\
             ) AS expanded_num \
             WHERE building_name ~ '^[0-9]+-[0-9]+$' \
               AND NOT EXISTS (\
                   SELECT 1 FROM ab_plus syn \
                   WHERE syn.uprn < 0 \
                     AND syn.building_number = expanded_num::TEXT \
                     AND syn.thoroughfare IS NOT DISTINCT FROM ab_plus.thoroughfare \
                     AND syn.postcode IS NOT DISTINCT FROM ab_plus.postcode\
               )",
        )
        .bind::<BigInt, _>(start)
        .execute(conn)
        .await
        .context("Range expansion insert failed")?;
        info!(inserted = inserted, "[Denormalizer] Inserted expanded range rows");

        execute_with_better_error(conn, "VACUUM ANALYZE ab_plus").await?;
        Ok(())
    }

    /// Add a "ST" twin for every original row whose thoroughfare contains
    /// "ST.", so both spellings match.
    pub async fn expand_thoroughfare_st_variants(&self) -> Result<()> {
        let start = self.next_synthetic_uprn().await?;
        info!(
            synthetic_uprn_start = start,
            "[Denormalizer] Expanding ST. thoroughfare variants"
        );

        let mut conn = self.pool.get().await?;
        let conn = &mut *conn;
        let candidates: CountRow = diesel::sql_query(
            "SELECT COUNT(*) AS count FROM ab_plus \
             WHERE thoroughfare LIKE '%ST.%' AND uprn > 0",
        )
        .get_result(conn)
        .await?;
        info!(
            candidates = candidates.count,
            "[Denormalizer] Original rows with ST. thoroughfares"
        );
        if candidates.count == 0 {
            return Ok(());
        }

        let inserted = diesel::sql_query(
            "INSERT INTO ab_plus (\
                 uprn, os_address_toid, udprn, organisation_name, department_name, \
                 po_box_number, sub_building_name, building_name, building_number, \
                 dependent_thoroughfare, thoroughfare, post_town, double_dependent_locality, \
                 dependent_locality, postcode, postcode_type, x_coordinate, y_coordinate, \
                 latitude, longitude, rpc, country, change_type, la_start_date, \
                 rm_start_date, last_update_date, class, geom\
             ) \
             SELECT \
                 $1 - ROW_NUMBER() OVER () + 1 AS uprn, \
                 os_address_toid, udprn, organisation_name, department_name, \
                 po_box_number, sub_building_name, building_name, building_number, \
                 dependent_thoroughfare, \
                 REPLACE(thoroughfare, 'ST.', 'ST') AS thoroughfare, \
                 post_town, double_dependent_locality, \
                 dependent_locality, postcode, postcode_type, x_coordinate, y_coordinate, \
                 latitude, longitude, rpc, country, change_type, la_start_date, \
                 rm_start_date, last_update_date, class, geom \
             FROM ab_plus \
             WHERE thoroughfare LIKE '%ST.%' \
               AND uprn > 0 \
               AND NOT EXISTS (\
                   SELECT 1 FROM ab_plus syn \
                   WHERE syn.uprn < 0 \
                     AND syn.thoroughfare = REPLACE(ab_plus.thoroughfare, 'ST.', 'ST') \
                     AND syn.building_number IS NOT DISTINCT FROM ab_plus.building_number \
                     AND syn.building_name IS NOT DISTINCT FROM ab_plus.building_name \
                     AND syn.postcode IS NOT DISTINCT FROM ab_plus.postcode\
               )",
        )
        .bind::<BigInt, _>(start)
        .execute(conn)
        .await
        .context("ST variant insert failed")?;
        info!(inserted = inserted, "[Denormalizer] Inserted ST variant rows");

        execute_with_better_error(conn, "VACUUM ANALYZE ab_plus").await?;
        Ok(())
    }
}
