//! Withdrawal engine.
//!
//! Processes blank-status tickets serially under a run-wide advisory lock.
//! A USDT ticket pays a 5% house fee, then distributes half of the net
//! amount through the same sibling/recommender chain as a deposit, with
//! reward rows typed `withdraw`. DHB tickets carry no reward chain.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use tracing::{error, info};

use crate::db::models::Withdraw;
use crate::db::{self, locations, withdraws};
use crate::engine::{
    distribute_to_recommender, distribute_to_siblings, record_system_reward, PayoutOrigin,
    RecommenderGrantOpts, RewardParams,
};
use crate::error::AppError;
use crate::types::{CoinType, RewardKind, RewardReason, WithdrawStatus};

/// Process every pending ticket once. Returns how many reached a terminal
/// status this run.
pub async fn run_once(pool: &PgPool, params: &RewardParams, now: DateTime<Utc>) -> Result<u32, AppError> {
    let lock = db::acquire_engine_lock(pool, db::LOCK_WITHDRAW_ENGINE).await?;

    let tickets = withdraws::get_pending_withdraws(pool).await?;
    let mut processed = 0;
    for ticket in &tickets {
        match process_ticket(pool, params, ticket, now).await {
            Ok(()) => {
                processed += 1;
                crate::metrics::record_withdrawal_processed();
            }
            Err(e) if e.is_conflict() => {}
            Err(e) => {
                error!(
                    ticket_id = ticket.id,
                    user_id = ticket.user_id,
                    error = %e,
                    "Failed to process withdrawal ticket"
                );
                crate::metrics::record_engine_error("withdraw");
            }
        }

        // Compact pass: flag freshly stopped locations before the next ticket.
        if let Err(e) = locations::settle_stopped_locations(pool).await {
            error!(error = %e, "Compact pass failed");
        }
    }

    lock.release().await?;
    Ok(processed)
}

/// Distribute one ticket in a single transaction.
async fn process_ticket(
    pool: &PgPool,
    params: &RewardParams,
    ticket: &Withdraw,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    db::advisory_xact_lock(&mut tx, db::LOCK_PLACEMENT).await?;

    // Claim the ticket; someone else may have taken it since the scan.
    let Some(current) = withdraws::get_withdraw_for_update(&mut tx, ticket.id).await? else {
        return Err(AppError::NotFound(format!("withdraw {} vanished", ticket.id)));
    };
    if current.status != WithdrawStatus::Created.as_str() {
        return Err(AppError::Conflict(format!(
            "withdraw {} already in status {:?}",
            current.id, current.status
        )));
    }
    withdraws::update_withdraw_status(&mut *tx, current.id, WithdrawStatus::Doing).await?;

    // DHB withdrawals pass straight through: no reward chain.
    if current.coin_type == CoinType::Dhb.as_str() {
        withdraws::update_withdraw_status(&mut *tx, current.id, WithdrawStatus::Pass).await?;
        tx.commit().await?;
        info!(ticket_id = current.id, user_id = current.user_id, "DHB withdrawal passed");
        return Ok(());
    }

    let origin = PayoutOrigin {
        kind: RewardKind::Withdraw,
        type_record_id: current.id,
    };

    // House fee. The balance was already debited at ticket creation, so the
    // fee is a ledger entry only.
    let fee = current.amount * 5 / 100;
    record_system_reward(&mut tx, fee, origin, RewardReason::SystemFee, 0).await?;

    // The reward pool is half of the net amount.
    let pool_value = (current.amount - fee) * 50 / 100;
    let mut residual = pool_value;

    if let Some(anchor) =
        locations::get_latest_location_by_user(&mut *tx, current.user_id).await?
    {
        residual -= distribute_to_siblings(
            &mut tx,
            origin,
            anchor.row,
            anchor.col,
            anchor.id,
            pool_value,
            now,
        )
        .await?;
    }

    residual -= distribute_to_recommender(
        &mut tx,
        params,
        current.user_id,
        pool_value,
        origin,
        RecommenderGrantOpts {
            include_base: true,
            record_referral: false,
        },
        now,
    )
    .await?;

    record_system_reward(&mut tx, residual, origin, RewardReason::SystemReward, 0).await?;
    withdraws::mark_withdraw_rewarded(&mut *tx, current.id, pool_value).await?;

    tx.commit().await?;

    info!(
        ticket_id = current.id,
        user_id = current.user_id,
        amount = current.amount,
        fee,
        pool = pool_value,
        residual,
        "Withdrawal rewarded"
    );
    Ok(())
}
