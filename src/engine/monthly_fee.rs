//! Month-end fee distribution.
//!
//! Once per calendar month, 1% of the prior month's accumulated house fees
//! is shared equally among users who referred at least five accepted first
//! deposits that month, clamped into each one's running location. Users
//! without a running location are skipped and their share is not
//! redistributed.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use sqlx::postgres::PgPool;
use tracing::{error, info};

use crate::db::models::NewReward;
use crate::db::{self, balances, configs, locations, users};
use crate::engine::grant_into_location;
use crate::error::AppError;
use crate::types::{BalanceRecordType, CoinType, RewardKind, RewardReason};

/// Referrals required in the prior month to qualify for a share.
const QUALIFYING_REFERRALS: i64 = 5;

/// Config key persisting the last distributed month ("YYYY-MM").
const DISTRIBUTED_MONTH_KEY: &str = "fee_distributed_month";

/// First instants of the prior month and of the current month.
pub fn prior_month_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let month_start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .unwrap();
    let prior_start = if now.month() == 1 {
        Utc.with_ymd_and_hms(now.year() - 1, 12, 1, 0, 0, 0).unwrap()
    } else {
        Utc.with_ymd_and_hms(now.year(), now.month() - 1, 1, 0, 0, 0)
            .unwrap()
    };
    (prior_start, month_start)
}

/// Run the distribution for the month preceding `now`, at most once per
/// calendar month. Returns how many users received a share.
pub async fn run_once(pool: &PgPool, now: DateTime<Utc>) -> Result<u32, AppError> {
    let lock = db::acquire_engine_lock(pool, db::LOCK_MONTHLY_FEE).await?;
    let result = distribute(pool, now).await;
    lock.release().await?;
    result
}

async fn distribute(pool: &PgPool, now: DateTime<Utc>) -> Result<u32, AppError> {
    let (from, to) = prior_month_bounds(now);
    let month_tag = format!("{:04}-{:02}", from.year(), from.month());

    // High-water mark: the run is idempotent per calendar month.
    if configs::get_config_value(pool, DISTRIBUTED_MONTH_KEY).await?.as_deref()
        == Some(month_tag.as_str())
    {
        return Ok(0);
    }

    let total_fee = balances::sum_system_fees_between(pool, from, to).await?;
    let qualifying =
        users::qualifying_recommenders(pool, from, to, QUALIFYING_REFERRALS).await?;

    info!(
        month = %month_tag,
        total_fee,
        qualifying = qualifying.len(),
        "Starting monthly fee distribution"
    );

    let mut paid = 0;
    if total_fee > 0 && !qualifying.is_empty() {
        let share = total_fee / 100 / qualifying.len() as i64;
        if share > 0 {
            for user_id in &qualifying {
                match pay_share(pool, *user_id, share, now).await {
                    Ok(true) => paid += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(user_id, error = %e, "Monthly fee share failed");
                        crate::metrics::record_engine_error("monthly_fee");
                    }
                }
            }
        }
    }

    configs::upsert_config(
        pool,
        DISTRIBUTED_MONTH_KEY,
        "Last month-end fee distribution",
        &month_tag,
    )
    .await?;

    info!(month = %month_tag, paid, "Monthly fee distribution complete");
    Ok(paid)
}

/// Clamp one user's share into their running location and credit it.
/// Returns false when the user has no running location (share is lost).
async fn pay_share(
    pool: &PgPool,
    user_id: i64,
    share: i64,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;
    db::advisory_xact_lock(&mut tx, db::LOCK_PLACEMENT).await?;

    let Some(location) = locations::get_running_location_for_update(&mut tx, user_id).await? else {
        return Ok(false);
    };

    let outcome = grant_into_location(&mut tx, &location, share, now).await?;
    if outcome.granted > 0 {
        let balance_record_id = balances::credit(
            &mut tx,
            user_id,
            outcome.granted,
            CoinType::Usdt,
            BalanceRecordType::Reward,
        )
        .await?;
        balances::insert_reward(
            &mut *tx,
            &NewReward {
                user_id,
                amount: outcome.granted,
                balance_record_id: Some(balance_record_id),
                reward_type: RewardKind::Fee.as_str().to_string(),
                type_record_id: location.id,
                reason: RewardReason::Fee.as_str().to_string(),
                reason_location_id: location.id,
                location_type: String::new(),
            },
        )
        .await?;
        crate::metrics::record_reward(RewardReason::Fee.as_str(), outcome.granted);
    }

    tx.commit().await?;
    Ok(outcome.granted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prior_month_bounds_mid_year() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let (from, to) = prior_month_bounds(now);
        assert_eq!(from, Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_prior_month_bounds_january() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let (from, to) = prior_month_bounds(now);
        assert_eq!(from, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_share_truncates() {
        // 10^12 fee, three qualifying users: each gets 10^10 exactly
        let total: i64 = 1_000_000_000_000;
        assert_eq!(total / 100 / 3, 3_333_333_333);
    }
}
