//! Deposit engine.
//!
//! Consumes paired deposit candidates from the chain poller. Each accepted
//! candidate runs as one transaction: idempotency re-check, placement and
//! payout chain, DHB balance credit, and both on-chain record rows. Hash
//! replays and already-running locations are conflicts and skipped silently.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use tracing::{debug, error, info};

use crate::db::models::NewEthUserRecord;
use crate::db::{self, balances, locations, records};
use crate::engine::{placement, RewardParams};
use crate::error::AppError;
use crate::money::{self, DepositTier};
use crate::types::{BalanceRecordType, CoinType};

/// A paired USDT+DHB deposit emitted by the chain poller.
#[derive(Debug, Clone)]
pub struct DepositCandidate {
    pub user_id: i64,
    pub usdt_hash: String,
    /// Raw wei amount of the USDT transfer, decimal string.
    pub usdt_wei: String,
    pub dhb_hash: String,
    /// Raw wei amount of the DHB transfer, decimal string.
    pub dhb_wei: String,
    pub tier: DepositTier,
}

/// Process a batch of candidates. Returns how many were accepted.
///
/// Errors on individual candidates are logged and do not stop the batch;
/// conflicts (hash replays, running locations) are skipped quietly.
pub async fn process_candidates(
    pool: &PgPool,
    params: &RewardParams,
    candidates: &[DepositCandidate],
    now: DateTime<Utc>,
) -> u32 {
    let mut accepted = 0;
    for candidate in candidates {
        match process_candidate(pool, params, candidate, now).await {
            Ok(()) => {
                accepted += 1;
                crate::metrics::record_deposit_ingested();
            }
            Err(e) if e.is_conflict() => {
                debug!(
                    user_id = candidate.user_id,
                    usdt_hash = %candidate.usdt_hash,
                    "Skipping deposit candidate: {e}"
                );
            }
            Err(e) => {
                error!(
                    user_id = candidate.user_id,
                    usdt_hash = %candidate.usdt_hash,
                    error = %e,
                    "Failed to process deposit candidate"
                );
                crate::metrics::record_engine_error("deposit");
            }
        }
    }
    accepted
}

/// Handle one paired deposit in a single transaction.
pub async fn process_candidate(
    pool: &PgPool,
    params: &RewardParams,
    candidate: &DepositCandidate,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    db::advisory_xact_lock(&mut tx, db::LOCK_PLACEMENT).await?;

    // Idempotency: the hash namespace spans both coin types.
    if records::hash_exists(&mut *tx, &candidate.usdt_hash).await? {
        return Err(AppError::Conflict(format!(
            "hash {} already ingested",
            candidate.usdt_hash
        )));
    }
    if records::hash_exists(&mut *tx, &candidate.dhb_hash).await? {
        return Err(AppError::Conflict(format!(
            "hash {} already ingested",
            candidate.dhb_hash
        )));
    }
    if locations::get_running_location_by_user(&mut *tx, candidate.user_id)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(format!(
            "user {} already has a running location",
            candidate.user_id
        )));
    }

    let location =
        placement::place_and_distribute(&mut tx, params, candidate.user_id, candidate.tier, now)
            .await?;

    // The DHB half is a passive pairing: credit the balance, no placement.
    let dhb_units = money::wei_to_units(money::parse_wei(&candidate.dhb_wei)?)?;
    balances::credit(
        &mut tx,
        candidate.user_id,
        dhb_units,
        CoinType::Dhb,
        BalanceRecordType::Deposit,
    )
    .await?;

    records::insert_eth_record(
        &mut *tx,
        &NewEthUserRecord {
            hash: candidate.usdt_hash.clone(),
            user_id: candidate.user_id,
            status: "success".to_string(),
            record_type: "deposit".to_string(),
            amount: candidate.usdt_wei.clone(),
            coin_type: "USDT".to_string(),
        },
    )
    .await?;
    records::insert_eth_record(
        &mut *tx,
        &NewEthUserRecord {
            hash: candidate.dhb_hash.clone(),
            user_id: candidate.user_id,
            status: "success".to_string(),
            record_type: "deposit".to_string(),
            amount: candidate.dhb_wei.clone(),
            coin_type: "DHB".to_string(),
        },
    )
    .await?;

    tx.commit().await?;

    info!(
        user_id = candidate.user_id,
        location_id = location.id,
        usdt_hash = %candidate.usdt_hash,
        dhb_hash = %candidate.dhb_hash,
        level = candidate.tier.level,
        "Deposit accepted"
    );
    Ok(())
}
