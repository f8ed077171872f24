//! User, user-info, referral-graph, and monthly-referral repositories.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::PgExecutor;

use crate::db::models::{User, UserCurrentMonthRecommend, UserInfo, UserRecommend};
use crate::error::AppError;

const USER_SELECT: &str = "id, address, undo, created_at, updated_at";
const USER_INFO_SELECT: &str = "id, user_id, vip, history_recommend, created_at, updated_at";
const USER_RECOMMEND_SELECT: &str = "id, user_id, recommend_code, created_at, updated_at";

pub async fn create_user<'e>(db: impl PgExecutor<'e>, address: &str) -> Result<User, AppError> {
    let query = format!(
        "INSERT INTO users (address) VALUES ($1) RETURNING {}",
        USER_SELECT
    );
    let user = sqlx::query_as::<_, User>(&query)
        .bind(address)
        .fetch_one(db)
        .await?;
    Ok(user)
}

pub async fn get_user_by_id<'e>(db: impl PgExecutor<'e>, id: i64) -> Result<Option<User>, AppError> {
    let query = format!("SELECT {} FROM users WHERE id = $1", USER_SELECT);
    let user = sqlx::query_as::<_, User>(&query)
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

pub async fn get_user_by_address<'e>(
    db: impl PgExecutor<'e>,
    address: &str,
) -> Result<Option<User>, AppError> {
    let query = format!("SELECT {} FROM users WHERE address = $1", USER_SELECT);
    let user = sqlx::query_as::<_, User>(&query)
        .bind(address)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

/// Batch address lookup for the sweep pairing step, keyed by address.
pub async fn get_users_by_addresses<'e>(
    db: impl PgExecutor<'e>,
    addresses: &[String],
) -> Result<HashMap<String, User>, AppError> {
    if addresses.is_empty() {
        return Ok(HashMap::new());
    }
    let query = format!("SELECT {} FROM users WHERE address = ANY($1)", USER_SELECT);
    let rows = sqlx::query_as::<_, User>(&query)
        .bind(addresses)
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().map(|u| (u.address.clone(), u)).collect())
}

pub async fn create_user_info<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<UserInfo, AppError> {
    let query = format!(
        "INSERT INTO user_info (user_id) VALUES ($1) RETURNING {}",
        USER_INFO_SELECT
    );
    let info = sqlx::query_as::<_, UserInfo>(&query)
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok(info)
}

pub async fn get_user_info<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<Option<UserInfo>, AppError> {
    let query = format!("SELECT {} FROM user_info WHERE user_id = $1", USER_INFO_SELECT);
    let info = sqlx::query_as::<_, UserInfo>(&query)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(info)
}

/// Row-locked read for the `history_recommend` increment; prevents lost
/// updates when two first-deposits referring to the same recommender race.
pub async fn get_user_info_for_update(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<Option<UserInfo>, AppError> {
    let query = format!(
        "SELECT {} FROM user_info WHERE user_id = $1 FOR UPDATE",
        USER_INFO_SELECT
    );
    let info = sqlx::query_as::<_, UserInfo>(&query)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(info)
}

pub async fn update_user_info(
    conn: &mut PgConnection,
    user_id: i64,
    vip: i64,
    history_recommend: i64,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE user_info SET vip = $1, history_recommend = $2, updated_at = NOW() WHERE user_id = $3",
    )
    .bind(vip)
    .bind(history_recommend)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn create_user_recommend<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
    recommend_code: &str,
) -> Result<UserRecommend, AppError> {
    let query = format!(
        "INSERT INTO user_recommend (user_id, recommend_code) VALUES ($1, $2) RETURNING {}",
        USER_RECOMMEND_SELECT
    );
    let rec = sqlx::query_as::<_, UserRecommend>(&query)
        .bind(user_id)
        .bind(recommend_code)
        .fetch_one(db)
        .await?;
    Ok(rec)
}

pub async fn get_user_recommend<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
) -> Result<Option<UserRecommend>, AppError> {
    let query = format!(
        "SELECT {} FROM user_recommend WHERE user_id = $1",
        USER_RECOMMEND_SELECT
    );
    let rec = sqlx::query_as::<_, UserRecommend>(&query)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(rec)
}

/// Subtree size: rows whose ancestor path starts with the given full code.
/// Codes are `D` + digits only, so no LIKE escaping is needed.
pub async fn count_subtree<'e>(db: impl PgExecutor<'e>, full_code: &str) -> Result<i64, AppError> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM user_recommend WHERE recommend_code LIKE $1 || '%'")
            .bind(full_code)
            .fetch_one(db)
            .await?;
    Ok(row.0)
}

/// Seed the area counter for a newly registered user's own full code.
pub async fn create_recommend_area<'e>(
    db: impl PgExecutor<'e>,
    full_code: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO user_recommend_area (recommend_code, num) VALUES ($1, 0)
         ON CONFLICT (recommend_code) DO NOTHING",
    )
    .bind(full_code)
    .execute(db)
    .await?;
    Ok(())
}

/// Bump the subtree counters of every ancestor prefix by one.
pub async fn increment_recommend_areas<'e>(
    db: impl PgExecutor<'e>,
    prefixes: &[String],
) -> Result<(), AppError> {
    if prefixes.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "UPDATE user_recommend_area SET num = num + 1, updated_at = NOW()
         WHERE recommend_code = ANY($1)",
    )
    .bind(prefixes)
    .execute(db)
    .await?;
    Ok(())
}

/// Append one accepted first-deposit referral for the recommender.
pub async fn create_month_recommend<'e>(
    db: impl PgExecutor<'e>,
    user_id: i64,
    recommend_user_id: i64,
    date: DateTime<Utc>,
) -> Result<UserCurrentMonthRecommend, AppError> {
    let rec = sqlx::query_as::<_, UserCurrentMonthRecommend>(
        "INSERT INTO user_current_month_recommend (user_id, recommend_user_id, date)
         VALUES ($1, $2, $3)
         RETURNING id, user_id, recommend_user_id, date, created_at, updated_at",
    )
    .bind(user_id)
    .bind(recommend_user_id)
    .bind(date)
    .fetch_one(db)
    .await?;
    Ok(rec)
}

/// Recommenders with at least `min_count` accepted referrals inside the
/// window, for the month-end fee distribution.
pub async fn qualifying_recommenders<'e>(
    db: impl PgExecutor<'e>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    min_count: i64,
) -> Result<Vec<i64>, AppError> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT user_id FROM user_current_month_recommend
         WHERE date >= $1 AND date < $2
         GROUP BY user_id
         HAVING COUNT(*) >= $3
         ORDER BY user_id",
    )
    .bind(from)
    .bind(to)
    .bind(min_count)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}
