//! Config table: editable tuning knobs keyed by name.

use std::collections::HashMap;

use sqlx::PgExecutor;

use crate::db::models::ConfigRow;
use crate::error::AppError;

pub async fn get_configs_by_keys<'e>(
    db: impl PgExecutor<'e>,
    keys: &[String],
) -> Result<HashMap<String, String>, AppError> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, ConfigRow>(
        "SELECT id, key_name, name, value, created_at, updated_at
         FROM config WHERE key_name = ANY($1)",
    )
    .bind(keys)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(|c| (c.key_name, c.value)).collect())
}

pub async fn get_config_value<'e>(
    db: impl PgExecutor<'e>,
    key: &str,
) -> Result<Option<String>, AppError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM config WHERE key_name = $1")
        .bind(key)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|r| r.0))
}

/// Write a knob, creating it if absent. Also used by the monthly distributor
/// to persist its high-water mark.
pub async fn upsert_config<'e>(
    db: impl PgExecutor<'e>,
    key: &str,
    name: &str,
    value: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO config (key_name, name, value) VALUES ($1, $2, $3)
         ON CONFLICT (key_name) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
    )
    .bind(key)
    .bind(name)
    .bind(value)
    .execute(db)
    .await?;
    Ok(())
}
