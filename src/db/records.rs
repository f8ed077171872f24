//! On-chain ingestion records: the idempotency key of the whole pipeline.

use std::collections::HashSet;

use sqlx::PgExecutor;

use crate::db::models::{EthUserRecord, NewEthUserRecord};
use crate::error::AppError;

const RECORD_SELECT: &str = "id, hash, user_id, status, record_type, amount, coin_type, created_at";

/// Which of the given hashes have already been ingested. Both coin types
/// share one hash namespace.
pub async fn get_known_hashes<'e>(
    db: impl PgExecutor<'e>,
    hashes: &[String],
) -> Result<HashSet<String>, AppError> {
    if hashes.is_empty() {
        return Ok(HashSet::new());
    }
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT hash FROM eth_user_record WHERE hash = ANY($1)")
            .bind(hashes)
            .fetch_all(db)
            .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn hash_exists<'e>(db: impl PgExecutor<'e>, hash: &str) -> Result<bool, AppError> {
    let row: (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM eth_user_record WHERE hash = $1)")
            .bind(hash)
            .fetch_one(db)
            .await?;
    Ok(row.0)
}

pub async fn insert_eth_record<'e>(
    db: impl PgExecutor<'e>,
    record: &NewEthUserRecord,
) -> Result<EthUserRecord, AppError> {
    let query = format!(
        "INSERT INTO eth_user_record (hash, user_id, status, record_type, amount, coin_type)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {RECORD_SELECT}"
    );
    let row = sqlx::query_as::<_, EthUserRecord>(&query)
        .bind(&record.hash)
        .bind(record.user_id)
        .bind(&record.status)
        .bind(&record.record_type)
        .bind(&record.amount)
        .bind(&record.coin_type)
        .fetch_one(db)
        .await?;
    Ok(row)
}
