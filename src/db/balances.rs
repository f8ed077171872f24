//! Balance, balance-record, and reward repositories.
//!
//! Balances are never updated without first appending the audit record; the
//! record's `balance` column is the post-update snapshot. Reward rows point
//! back at the record that moved the money, except house rewards which move
//! none.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::PgExecutor;

use crate::db::models::{NewReward, Reward, UserBalance};
use crate::error::AppError;
use crate::types::{BalanceRecordType, CoinType};

const BALANCE_SELECT: &str = "id, user_id, balance_usdt, balance_dhb, created_at, updated_at";
const REWARD_SELECT: &str = "id, user_id, amount, balance_record_id, reward_type, type_record_id, \
                             reason, reason_location_id, location_type, created_at";

fn balance_column(coin: CoinType) -> &'static str {
    match coin {
        CoinType::Usdt => "balance_usdt",
        CoinType::Dhb => "balance_dhb",
    }
}

pub async fn create_user_balance<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<UserBalance, AppError> {
    let query = format!(
        "INSERT INTO user_balance (user_id) VALUES ($1) RETURNING {}",
        BALANCE_SELECT
    );
    let balance = sqlx::query_as::<_, UserBalance>(&query)
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok(balance)
}

pub async fn get_user_balance<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<Option<UserBalance>, AppError> {
    let query = format!("SELECT {} FROM user_balance WHERE user_id = $1", BALANCE_SELECT);
    let balance = sqlx::query_as::<_, UserBalance>(&query)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(balance)
}

/// Credit a balance and append the audit record. Returns the record id.
pub async fn credit(
    conn: &mut PgConnection,
    user_id: i64,
    amount: i64,
    coin: CoinType,
    record_type: BalanceRecordType,
) -> Result<i64, AppError> {
    let col = balance_column(coin);
    let query = format!(
        "UPDATE user_balance SET {col} = {col} + $1, updated_at = NOW()
         WHERE user_id = $2 RETURNING {col}"
    );
    let row: Option<(i64,)> = sqlx::query_as(&query)
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    let balance = row
        .ok_or_else(|| AppError::NotFound(format!("user balance not found for user {user_id}")))?
        .0;

    insert_balance_record(conn, user_id, balance, amount, record_type, coin).await
}

/// Debit a balance, refusing to go negative. Returns the record id.
pub async fn debit(
    conn: &mut PgConnection,
    user_id: i64,
    amount: i64,
    coin: CoinType,
    record_type: BalanceRecordType,
) -> Result<i64, AppError> {
    let col = balance_column(coin);
    let query = format!(
        "UPDATE user_balance SET {col} = {col} - $1, updated_at = NOW()
         WHERE user_id = $2 AND {col} >= $1 RETURNING {col}"
    );
    let row: Option<(i64,)> = sqlx::query_as(&query)
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    let balance = row
        .ok_or_else(|| AppError::InvalidInput(format!("insufficient {coin} balance")))?
        .0;

    insert_balance_record(conn, user_id, balance, -amount, record_type, coin).await
}

async fn insert_balance_record(
    conn: &mut PgConnection,
    user_id: i64,
    balance: i64,
    amount: i64,
    record_type: BalanceRecordType,
    coin: CoinType,
) -> Result<i64, AppError> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO user_balance_record (user_id, balance, amount, record_type, coin_type)
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(user_id)
    .bind(balance)
    .bind(amount)
    .bind(record_type.as_str())
    .bind(coin.as_str())
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.0)
}

pub async fn insert_reward<'e>(db: impl PgExecutor<'e>, reward: &NewReward) -> Result<i64, AppError> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO reward (user_id, amount, balance_record_id, reward_type, type_record_id,
             reason, reason_location_id, location_type)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
    )
    .bind(reward.user_id)
    .bind(reward.amount)
    .bind(reward.balance_record_id)
    .bind(&reward.reward_type)
    .bind(reward.type_record_id)
    .bind(&reward.reason)
    .bind(reward.reason_location_id)
    .bind(&reward.location_type)
    .fetch_one(db)
    .await?;
    Ok(row.0)
}

/// Location-payout rewards for a user, newest first, optionally filtered by
/// row/col flavour.
pub async fn list_location_rewards<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
    location_type: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Reward>, AppError> {
    let query = format!(
        "SELECT {REWARD_SELECT} FROM reward
         WHERE user_id = $1 AND reason = 'location'
           AND ($2::VARCHAR IS NULL OR location_type = $2)
         ORDER BY id DESC LIMIT $3 OFFSET $4"
    );
    let rows = sqlx::query_as::<_, Reward>(&query)
        .bind(user_id)
        .bind(location_type)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
    Ok(rows)
}

pub async fn count_location_rewards<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
    location_type: Option<&str>,
) -> Result<i64, AppError> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM reward
         WHERE user_id = $1 AND reason = 'location'
           AND ($2::VARCHAR IS NULL OR location_type = $2)",
    )
    .bind(user_id)
    .bind(location_type)
    .fetch_one(db)
    .await?;
    Ok(row.0)
}

/// Rewards for a user filtered by reason set, newest first.
pub async fn list_rewards_by_reasons<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
    reasons: &[String],
    limit: i64,
    offset: i64,
) -> Result<Vec<Reward>, AppError> {
    let query = format!(
        "SELECT {REWARD_SELECT} FROM reward
         WHERE user_id = $1 AND reason = ANY($2)
         ORDER BY id DESC LIMIT $3 OFFSET $4"
    );
    let rows = sqlx::query_as::<_, Reward>(&query)
        .bind(user_id)
        .bind(reasons)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
    Ok(rows)
}

pub async fn count_rewards_by_reasons<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
    reasons: &[String],
) -> Result<i64, AppError> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM reward WHERE user_id = $1 AND reason = ANY($2)")
            .bind(user_id)
            .bind(reasons)
            .fetch_one(db)
            .await?;
    Ok(row.0)
}

/// Cumulative reward totals per reason for one user.
pub async fn reward_totals_by_reason<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<Vec<(String, i64)>, AppError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT reason, COALESCE(SUM(amount), 0)::BIGINT FROM reward
         WHERE user_id = $1 GROUP BY reason",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Total house fees collected inside a window, for month-end distribution.
pub async fn sum_system_fees_between<'e>(
    db: impl PgExecutor<'e>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<i64, AppError> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM reward
         WHERE reason = 'system_fee' AND created_at >= $1 AND created_at < $2",
    )
    .bind(from)
    .bind(to)
    .fetch_one(db)
    .await?;
    Ok(row.0)
}

/// Rewards attached to one origin record (a location id or a ticket id).
pub async fn list_rewards_by_type_record<'e>(
    db: impl PgExecutor<'e>,
    reward_type: &str,
    type_record_id: i64,
) -> Result<Vec<Reward>, AppError> {
    let query = format!(
        "SELECT {REWARD_SELECT} FROM reward
         WHERE reward_type = $1 AND type_record_id = $2 ORDER BY id"
    );
    let rows = sqlx::query_as::<_, Reward>(&query)
        .bind(reward_type)
        .bind(type_record_id)
        .fetch_all(db)
        .await?;
    Ok(rows)
}
