// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Reference-store (PostgreSQL) helpers.

use diesel::QueryResult;
use diesel_async::{
    pooled_connection::{
        bb8::{Pool, PooledConnection},
        AsyncDieselConnectionManager, PoolError,
    },
    AsyncPgConnection, RunQueryDsl,
};
use std::sync::Arc;

pub type MyDbConnection = AsyncPgConnection;
pub type PgPool = Pool<MyDbConnection>;
pub type PgDbPool = Arc<PgPool>;
pub type PgPoolConnection<'a> = PooledConnection<'a, MyDbConnection>;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 10;

pub async fn new_db_pool(
    database_url: &str,
    max_pool_size: Option<u32>,
) -> Result<PgDbPool, PoolError> {
    let config = AsyncDieselConnectionManager::<MyDbConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_pool_size.unwrap_or(DEFAULT_MAX_POOL_SIZE))
        .build(config)
        .await?;
    Ok(Arc::new(pool))
}

/// Execute a plain SQL statement, logging the statement on failure.
pub async fn execute_with_better_error(
    conn: &mut MyDbConnection,
    query: &str,
) -> QueryResult<usize> {
    tracing::debug!("Executing query: {:?}", query);
    let res = diesel::sql_query(query).execute(conn).await;
    if let Err(ref e) = res {
        tracing::warn!("Error running query: {:?}\n{}", e, query);
    }
    res
}

/// Per-transaction tuning for the bulk matching session. `SET LOCAL` scopes
/// the settings to the enclosing transaction.
pub async fn tune_matching_session(conn: &mut MyDbConnection) -> QueryResult<()> {
    for statement in [
        "SET LOCAL work_mem = '256MB'",
        "SET LOCAL maintenance_work_mem = '512MB'",
        "SET LOCAL synchronous_commit = OFF",
    ] {
        diesel::sql_query(statement).execute(conn).await?;
    }
    Ok(())
}
