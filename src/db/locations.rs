//! Location repository.
//!
//! The id sequence is the only globally shared monotonic resource; placement
//! reads the last row by id under the placement advisory lock, so `(row, col)`
//! assignment is strictly monotone across deposits.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::PgExecutor;

use crate::db::models::{Location, NewLocation};
use crate::error::AppError;
use crate::types::LocationStatus;

const LOCATION_SELECT: &str = "id, user_id, status, current_level, current, current_max, \
                               row_num, col_num, stop_date, settled, created_at, updated_at";

pub async fn create_location<'e>(
    db: impl PgExecutor<'e>,
    new: &NewLocation,
) -> Result<Location, AppError> {
    let query = format!(
        "INSERT INTO location (user_id, status, current_level, current, current_max, row_num, col_num)
         VALUES ($1, 'running', $2, 0, $3, $4, $5)
         RETURNING {LOCATION_SELECT}"
    );
    let location = sqlx::query_as::<_, Location>(&query)
        .bind(new.user_id)
        .bind(new.current_level)
        .bind(new.current_max)
        .bind(new.row)
        .bind(new.col)
        .fetch_one(db)
        .await?;
    Ok(location)
}

/// The most recently created location across all users.
pub async fn get_last_location<'e>(db: impl PgExecutor<'e>) -> Result<Option<Location>, AppError> {
    let query = format!("SELECT {LOCATION_SELECT} FROM location ORDER BY id DESC LIMIT 1");
    let location = sqlx::query_as::<_, Location>(&query)
        .fetch_optional(db)
        .await?;
    Ok(location)
}

pub async fn get_running_location_by_user<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<Option<Location>, AppError> {
    let query = format!(
        "SELECT {LOCATION_SELECT} FROM location WHERE user_id = $1 AND status = 'running'"
    );
    let location = sqlx::query_as::<_, Location>(&query)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(location)
}

/// Row-locked variant used before clamping a grant into the location.
pub async fn get_running_location_for_update(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<Option<Location>, AppError> {
    let query = format!(
        "SELECT {LOCATION_SELECT} FROM location
         WHERE user_id = $1 AND status = 'running' FOR UPDATE"
    );
    let location = sqlx::query_as::<_, Location>(&query)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(location)
}

/// A user's most recent location regardless of status.
pub async fn get_latest_location_by_user<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<Option<Location>, AppError> {
    let query = format!(
        "SELECT {LOCATION_SELECT} FROM location
         WHERE user_id = $1 ORDER BY id DESC LIMIT 1"
    );
    let location = sqlx::query_as::<_, Location>(&query)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(location)
}

/// Running locations on the same row or the same column as a new slot,
/// locked in id order to keep concurrent payout transactions deadlock-free.
pub async fn get_sibling_locations_for_update(
    conn: &mut PgConnection,
    row: i64,
    col: i64,
    exclude_id: i64,
) -> Result<Vec<Location>, AppError> {
    let query = format!(
        "SELECT {LOCATION_SELECT} FROM location
         WHERE (row_num = $1 OR col_num = $2) AND status = 'running' AND id != $3
         ORDER BY id FOR UPDATE"
    );
    let locations = sqlx::query_as::<_, Location>(&query)
        .bind(row)
        .bind(col)
        .bind(exclude_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(locations)
}

/// Persist a clamped grant. The caller has computed the new counter under a
/// row lock; a location hitting its cap stops here and never restarts.
pub async fn update_location_counters(
    conn: &mut PgConnection,
    id: i64,
    current: i64,
    status: LocationStatus,
    stop_date: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE location SET current = $1, status = $2, stop_date = $3, updated_at = NOW()
         WHERE id = $4",
    )
    .bind(current)
    .bind(status.as_str())
    .bind(stop_date)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Compact pass: flag stopped locations whose slot has been processed so
/// later scans can tell them apart from freshly stopped ones.
pub async fn settle_stopped_locations<'e>(db: impl PgExecutor<'e>) -> Result<u64, AppError> {
    let result = sqlx::query(
        "UPDATE location SET settled = TRUE, updated_at = NOW()
         WHERE status = 'stop' AND settled = FALSE",
    )
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// How many locations occupy a row (for the user-info sibling counts).
pub async fn count_locations_in_row<'e>(db: impl PgExecutor<'e>, row: i64) -> Result<i64, AppError> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM location WHERE row_num = $1")
        .bind(row)
        .fetch_one(db)
        .await?;
    Ok(count.0)
}

/// How many locations occupy a column.
pub async fn count_locations_in_col<'e>(db: impl PgExecutor<'e>, col: i64) -> Result<i64, AppError> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM location WHERE col_num = $1")
        .bind(col)
        .fetch_one(db)
        .await?;
    Ok(count.0)
}
