//! Reward engines.
//!
//! Deposit placement, withdrawal distribution, and the month-end fee run all
//! funnel through the grant helpers here: every payout is clamped against the
//! receiving location's remaining headroom under a row lock, credited through
//! the balance-record audit path, and mirrored as a reward row.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool};
use tracing::debug;

use crate::db::models::{Location, NewReward};
use crate::db::{balances, configs, locations, users};
use crate::error::AppError;
use crate::referral;
use crate::types::{
    BalanceRecordType, Beneficiary, CoinType, LocationStatus, RewardKind, RewardReason,
    SiblingKind,
};

pub mod deposit;
pub mod monthly_fee;
pub mod placement;
pub mod withdraw;

/// Percent knobs driving payout math, loaded from the config table with
/// documented defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardParams {
    /// Direct recommender share, percent.
    pub recommend_need: i64,
    /// VIP recommender shares for tiers 1..5, percent.
    pub vip_rates: [i64; 5],
    /// Direct-referral counts required for tiers 1..5.
    pub vip_thresholds: [i64; 5],
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            recommend_need: 20,
            vip_rates: [4, 8, 12, 16, 20],
            vip_thresholds: referral::DEFAULT_VIP_THRESHOLDS,
        }
    }
}

impl RewardParams {
    /// VIP share percent for a tier; zero at tier 0 and out-of-range tiers.
    pub fn vip_rate(&self, vip: i64) -> i64 {
        if (1..=5).contains(&vip) {
            self.vip_rates[(vip - 1) as usize]
        } else {
            0
        }
    }

    /// Load from the config table, keeping defaults for missing or
    /// unparseable rows.
    pub async fn load(pool: &PgPool) -> Result<Self, AppError> {
        let keys: Vec<String> = std::iter::once("recommend_need".to_string())
            .chain((1..=5).map(|i| format!("recommend_need_vip{i}")))
            .chain((1..=5).map(|i| format!("vip_threshold{i}")))
            .collect();
        let values = configs::get_configs_by_keys(pool, &keys).await?;

        let mut params = RewardParams::default();
        let parse = |key: &str| values.get(key).and_then(|v| v.parse::<i64>().ok());
        if let Some(v) = parse("recommend_need") {
            params.recommend_need = v;
        }
        for i in 0..5 {
            if let Some(v) = parse(&format!("recommend_need_vip{}", i + 1)) {
                params.vip_rates[i] = v;
            }
            if let Some(v) = parse(&format!("vip_threshold{}", i + 1)) {
                params.vip_thresholds[i] = v;
            }
        }
        Ok(params)
    }
}

/// What produced a payout: the new location of a deposit or a withdrawal
/// ticket. Carried into every reward row as `(reward_type, type_record_id)`.
#[derive(Debug, Clone, Copy)]
pub struct PayoutOrigin {
    pub kind: RewardKind,
    pub type_record_id: i64,
}

/// Result of clamping a grant into a location.
#[derive(Debug, Clone, Copy)]
pub struct GrantOutcome {
    pub granted: i64,
    pub stopped: bool,
}

/// Clamp `delta` into a location's remaining headroom and persist the new
/// counter. The caller must hold a row lock on the location.
pub async fn grant_into_location(
    conn: &mut PgConnection,
    location: &Location,
    delta: i64,
    now: DateTime<Utc>,
) -> Result<GrantOutcome, AppError> {
    if location.status != LocationStatus::Running.as_str() || delta <= 0 {
        return Ok(GrantOutcome {
            granted: 0,
            stopped: false,
        });
    }
    let headroom = location.current_max - location.current;
    if headroom <= 0 {
        return Err(AppError::Fatal(format!(
            "running location {} has no headroom (current {} >= max {})",
            location.id, location.current, location.current_max
        )));
    }

    let granted = delta.min(headroom);
    let current = location.current + granted;
    let stopped = current == location.current_max;
    let (status, stop_date) = if stopped {
        (LocationStatus::Stop, Some(now))
    } else {
        (LocationStatus::Running, location.stop_date)
    };
    locations::update_location_counters(conn, location.id, current, status, stop_date).await?;

    if stopped {
        debug!(location_id = location.id, "Location reached its cap and stopped");
        crate::metrics::record_location_stopped();
    }
    Ok(GrantOutcome { granted, stopped })
}

/// Credit a user and append the matching reward row.
async fn pay_reward(
    conn: &mut PgConnection,
    user_id: i64,
    amount: i64,
    origin: PayoutOrigin,
    reason: RewardReason,
    reason_location_id: i64,
    location_type: Option<SiblingKind>,
) -> Result<(), AppError> {
    let balance_record_id = balances::credit(
        conn,
        user_id,
        amount,
        CoinType::Usdt,
        BalanceRecordType::Reward,
    )
    .await?;
    balances::insert_reward(
        &mut *conn,
        &NewReward {
            user_id,
            amount,
            balance_record_id: Some(balance_record_id),
            reward_type: origin.kind.as_str().to_string(),
            type_record_id: origin.type_record_id,
            reason: reason.as_str().to_string(),
            reason_location_id,
            location_type: location_type.map(|k| k.as_str()).unwrap_or("").to_string(),
        },
    )
    .await?;
    crate::metrics::record_reward(reason.as_str(), amount);
    Ok(())
}

/// Record a house reward. Moves no balance; the sentinel beneficiary marks
/// the row. Zero amounts are not recorded.
pub async fn record_system_reward(
    conn: &mut PgConnection,
    amount: i64,
    origin: PayoutOrigin,
    reason: RewardReason,
    reason_location_id: i64,
) -> Result<(), AppError> {
    if amount < 0 {
        return Err(AppError::Fatal(format!(
            "negative residual {amount} for {:?} {}",
            origin.kind, origin.type_record_id
        )));
    }
    if amount == 0 {
        return Ok(());
    }
    balances::insert_reward(
        &mut *conn,
        &NewReward {
            user_id: Beneficiary::System.storage_id(),
            amount,
            balance_record_id: None,
            reward_type: origin.kind.as_str().to_string(),
            type_record_id: origin.type_record_id,
            reason: reason.as_str().to_string(),
            reason_location_id,
            location_type: String::new(),
        },
    )
    .await?;
    crate::metrics::record_reward(reason.as_str(), amount);
    Ok(())
}

/// Pay every running location sharing the row or the column of a slot.
///
/// Row co-occupants receive 5% of `value`, column co-occupants 1%, truncated
/// integer division, each clamped to the receiver's headroom. Returns the
/// total actually granted.
pub async fn distribute_to_siblings(
    conn: &mut PgConnection,
    origin: PayoutOrigin,
    row: i64,
    col: i64,
    exclude_location_id: i64,
    value: i64,
    now: DateTime<Utc>,
) -> Result<i64, AppError> {
    let siblings =
        locations::get_sibling_locations_for_update(conn, row, col, exclude_location_id).await?;

    let mut total = 0;
    for sibling in &siblings {
        let (delta, kind) = if sibling.row == row {
            (value * 5 / 100, SiblingKind::Row)
        } else {
            (value / 100, SiblingKind::Col)
        };
        let outcome = grant_into_location(conn, sibling, delta, now).await?;
        if outcome.granted > 0 {
            pay_reward(
                conn,
                sibling.user_id,
                outcome.granted,
                origin,
                RewardReason::Location,
                sibling.id,
                Some(kind),
            )
            .await?;
            total += outcome.granted;
        }
    }
    Ok(total)
}

/// Options for the recommender leg of a distribution.
#[derive(Debug, Clone, Copy)]
pub struct RecommenderGrantOpts {
    /// Pay the base `recommend_need` share.
    pub include_base: bool,
    /// Count this event as an accepted referral: bump `history_recommend`,
    /// recompute VIP, append the current-month row.
    pub record_referral: bool,
}

/// Pay the direct recommender of a user, clamped into the recommender's
/// running location. Returns the total actually granted.
pub async fn distribute_to_recommender(
    conn: &mut PgConnection,
    params: &RewardParams,
    user_id: i64,
    value: i64,
    origin: PayoutOrigin,
    opts: RecommenderGrantOpts,
    now: DateTime<Utc>,
) -> Result<i64, AppError> {
    let Some(rec) = users::get_user_recommend(&mut *conn, user_id).await? else {
        return Ok(0);
    };
    let Some(recommender_id) = referral::direct_recommender(&rec.recommend_code) else {
        return Ok(0);
    };

    let mut total = 0;

    if opts.include_base {
        if let Some(location) =
            locations::get_running_location_for_update(conn, recommender_id).await?
        {
            let delta = value * params.recommend_need / 100;
            let outcome = grant_into_location(conn, &location, delta, now).await?;
            if outcome.granted > 0 {
                pay_reward(
                    conn,
                    recommender_id,
                    outcome.granted,
                    origin,
                    RewardReason::Recommend,
                    location.id,
                    None,
                )
                .await?;
                total += outcome.granted;
            }

            if opts.record_referral {
                if let Some(info) = users::get_user_info_for_update(conn, recommender_id).await? {
                    let history = info.history_recommend + 1;
                    let vip = referral::vip_for(history, &params.vip_thresholds);
                    users::update_user_info(conn, recommender_id, vip, history).await?;
                }
                users::create_month_recommend(&mut *conn, recommender_id, user_id, now).await?;
            }
        }
    }

    // VIP bonus: independent of the base share, but reads the tier after a
    // referral bump and skips a location stopped by the base clamp.
    if let Some(info) = users::get_user_info(&mut *conn, recommender_id).await? {
        let rate = params.vip_rate(info.vip);
        if rate > 0 {
            if let Some(location) =
                locations::get_running_location_for_update(conn, recommender_id).await?
            {
                let delta = value * rate / 100;
                let outcome = grant_into_location(conn, &location, delta, now).await?;
                if outcome.granted > 0 {
                    pay_reward(
                        conn,
                        recommender_id,
                        outcome.granted,
                        origin,
                        RewardReason::RecommendVip,
                        location.id,
                        None,
                    )
                    .await?;
                    total += outcome.granted;
                }
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vip_rate_bounds() {
        let params = RewardParams::default();
        assert_eq!(params.vip_rate(0), 0);
        assert_eq!(params.vip_rate(1), 4);
        assert_eq!(params.vip_rate(3), 12);
        assert_eq!(params.vip_rate(5), 20);
        assert_eq!(params.vip_rate(6), 0);
        assert_eq!(params.vip_rate(-1), 0);
    }

    #[test]
    fn test_default_params_match_documented_defaults() {
        let params = RewardParams::default();
        assert_eq!(params.recommend_need, 20);
        assert_eq!(params.vip_rates, [4, 8, 12, 16, 20]);
        assert_eq!(params.vip_thresholds, [2, 4, 6, 8, 10]);
    }
}
