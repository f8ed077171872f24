//! Withdrawal ticket repository.

use sqlx::postgres::PgConnection;
use sqlx::PgExecutor;

use crate::db::models::Withdraw;
use crate::error::AppError;
use crate::types::{CoinType, WithdrawStatus};

const WITHDRAW_SELECT: &str =
    "id, user_id, amount, rel_amount, status, coin_type, balance_record_id, created_at, updated_at";

pub async fn create_withdraw<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
    amount: i64,
    coin: CoinType,
    balance_record_id: i64,
) -> Result<Withdraw, AppError> {
    let query = format!(
        "INSERT INTO withdraw (user_id, amount, coin_type, balance_record_id)
         VALUES ($1, $2, $3, $4)
         RETURNING {WITHDRAW_SELECT}"
    );
    let ticket = sqlx::query_as::<_, Withdraw>(&query)
        .bind(user_id)
        .bind(amount)
        .bind(coin.as_str())
        .bind(balance_record_id)
        .fetch_one(db)
        .await?;
    Ok(ticket)
}

/// Unprocessed tickets in creation order.
pub async fn get_pending_withdraws<'e>(db: impl PgExecutor<'e>) -> Result<Vec<Withdraw>, AppError> {
    let query = format!("SELECT {WITHDRAW_SELECT} FROM withdraw WHERE status = '' ORDER BY id");
    let tickets = sqlx::query_as::<_, Withdraw>(&query).fetch_all(db).await?;
    Ok(tickets)
}

/// Row-locked re-read inside the processing transaction; a ticket another
/// run already claimed comes back with a non-blank status.
pub async fn get_withdraw_for_update(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<Withdraw>, AppError> {
    let query = format!("SELECT {WITHDRAW_SELECT} FROM withdraw WHERE id = $1 FOR UPDATE");
    let ticket = sqlx::query_as::<_, Withdraw>(&query)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(ticket)
}

pub async fn update_withdraw_status<'e>(
    db: impl PgExecutor<'e>,
    id: i64,
    status: WithdrawStatus,
) -> Result<(), AppError> {
    sqlx::query("UPDATE withdraw SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(status.as_str())
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

/// Terminal transition for a distributed ticket, recording the pool that
/// was actually paid out.
pub async fn mark_withdraw_rewarded<'e>(
    db: impl PgExecutor<'e>,
    id: i64,
    rel_amount: i64,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE withdraw SET status = 'rewarded', rel_amount = $1, updated_at = NOW()
         WHERE id = $2",
    )
    .bind(rel_amount)
    .bind(id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn list_withdraws_by_user<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<Withdraw>, AppError> {
    let query = format!(
        "SELECT {WITHDRAW_SELECT} FROM withdraw
         WHERE user_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3"
    );
    let tickets = sqlx::query_as::<_, Withdraw>(&query)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
    Ok(tickets)
}

pub async fn count_withdraws_by_user<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<i64, AppError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM withdraw WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok(row.0)
}
