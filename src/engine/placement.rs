//! Location placement.
//!
//! Assigns the next slot in the 3-column grid and runs the deposit payout
//! chain: sibling shares, recommender bonuses, system residual, depositor
//! credit. The caller wraps this in one transaction holding the placement
//! advisory lock, so slot assignment is strictly monotone in `(row, col)`.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use tracing::info;

use crate::db::models::{Location, NewLocation};
use crate::db::{balances, locations};
use crate::engine::{
    distribute_to_recommender, distribute_to_siblings, record_system_reward, PayoutOrigin,
    RecommenderGrantOpts, RewardParams,
};
use crate::error::AppError;
use crate::money::DepositTier;
use crate::types::{BalanceRecordType, CoinType, RewardKind, RewardReason};

/// The slot following the last occupied one: row-major, three columns.
pub fn next_slot(last: Option<(i64, i64)>) -> (i64, i64) {
    match last {
        None => (1, 1),
        Some((row, col)) if col < 3 => (row, col + 1),
        Some((row, _)) => (row + 1, 1),
    }
}

/// Place a new location for an accepted deposit and distribute its seed.
///
/// Runs steps A through E against an open transaction:
/// placement, sibling payouts, recommender bonuses, system residual, and the
/// depositor's own balance credit. Returns the created location.
pub async fn place_and_distribute(
    conn: &mut PgConnection,
    params: &RewardParams,
    user_id: i64,
    tier: DepositTier,
    now: DateTime<Utc>,
) -> Result<Location, AppError> {
    // First location for this user? Decided before the new row exists.
    let is_first = locations::get_latest_location_by_user(&mut *conn, user_id)
        .await?
        .is_none();

    // Step A: placement
    let last = locations::get_last_location(&mut *conn).await?;
    let (row, col) = next_slot(last.map(|l| (l.row, l.col)));
    let location = locations::create_location(
        &mut *conn,
        &NewLocation {
            user_id,
            current_level: tier.level,
            current_max: tier.current_max,
            row,
            col,
        },
    )
    .await?;

    let origin = PayoutOrigin {
        kind: RewardKind::Location,
        type_record_id: location.id,
    };
    let mut residual = tier.seed;

    // Step B: row and column co-occupants
    residual -= distribute_to_siblings(conn, origin, row, col, location.id, tier.seed, now).await?;

    // Steps C and D: recommender first-deposit bonus and VIP bonus
    residual -= distribute_to_recommender(
        conn,
        params,
        user_id,
        tier.seed,
        origin,
        RecommenderGrantOpts {
            include_base: is_first,
            record_referral: is_first,
        },
        now,
    )
    .await?;

    // Step E: system residual, then the depositor's own credit
    record_system_reward(conn, residual, origin, RewardReason::SystemReward, location.id).await?;
    balances::credit(
        conn,
        user_id,
        tier.seed,
        CoinType::Usdt,
        BalanceRecordType::Deposit,
    )
    .await?;

    info!(
        user_id,
        location_id = location.id,
        row,
        col,
        level = tier.level,
        seed = tier.seed,
        residual,
        "Placed location and distributed deposit rewards"
    );
    crate::metrics::record_location_created();

    Ok(location)
}
