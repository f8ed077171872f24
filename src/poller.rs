//! Chain poller.
//!
//! Sweeps the block explorer for USDT and DHB transfers into the receiving
//! address, pairs the two legs per sender on equal wei value and a recognised
//! tier, and hands paired candidates to the deposit engine. The poller never
//! writes the ledger itself; re-running over any overlapping window is safe
//! because the hash namespace is unique.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sqlx::postgres::PgPool;
use tracing::{info, warn};

use crate::config::ExplorerConfig;
use crate::db::models::User;
use crate::db::{self, records, users};
use crate::engine::deposit::{self, DepositCandidate};
use crate::engine::RewardParams;
use crate::error::AppError;
use crate::explorer::{ExplorerClient, TokenTransfer};
use crate::money;

pub struct ChainPoller {
    client: ExplorerClient,
    pool: PgPool,
    usdt_contract: String,
    dhb_contract: String,
    page_size: u32,
    max_pages: u32,
}

impl ChainPoller {
    pub fn new(config: &ExplorerConfig, pool: PgPool) -> Result<Self, AppError> {
        Ok(Self {
            client: ExplorerClient::new(config)?,
            pool,
            usdt_contract: config.usdt_contract.clone(),
            dhb_contract: config.dhb_contract.clone(),
            page_size: config.page_size,
            max_pages: config.max_pages,
        })
    }

    /// One full sweep: page through both contracts, pair, ingest.
    /// Returns how many deposits were accepted.
    pub async fn sweep(&self, params: &RewardParams) -> Result<u32, AppError> {
        let lock = db::acquire_engine_lock(&self.pool, db::LOCK_DEPOSIT_ENGINE).await?;
        let result = self.sweep_inner(params).await;
        lock.release().await?;
        result
    }

    async fn sweep_inner(&self, params: &RewardParams) -> Result<u32, AppError> {
        let mut accepted = 0;
        // Hashes claimed earlier in this sweep; a DHB leg pairs at most once.
        let mut claimed = HashSet::new();

        for page in 1..=self.max_pages {
            let usdt = self
                .client
                .token_transfers(&self.usdt_contract, self.page_size, page)
                .await?;
            if usdt.is_empty() {
                break;
            }

            let mut dhb = self
                .client
                .token_transfers(&self.dhb_contract, self.page_size, page)
                .await?;
            // One-page overlap so a pair split across the DHB pagination
            // boundary is still visible.
            let overlap = self
                .client
                .token_transfers(&self.dhb_contract, self.page_size, page + 1)
                .await?;
            for (hash, transfer) in overlap {
                dhb.entry(hash).or_insert(transfer);
            }

            let mut addresses: Vec<String> = Vec::new();
            let mut hashes: Vec<String> = Vec::new();
            for t in usdt.values().chain(dhb.values()) {
                addresses.push(t.from.clone());
                hashes.push(t.hash.clone());
            }
            let known_users = users::get_users_by_addresses(&self.pool, &addresses).await?;
            let known_hashes = records::get_known_hashes(&self.pool, &hashes).await?;

            let candidates = pair_transfers(&usdt, &dhb, &known_users, &known_hashes, &mut claimed);
            if !candidates.is_empty() {
                info!(page, candidates = candidates.len(), "Paired deposit candidates");
            }
            accepted +=
                deposit::process_candidates(&self.pool, params, &candidates, Utc::now()).await;
        }

        crate::metrics::record_sweep();
        Ok(accepted)
    }

    /// Sweep once, logging instead of failing; used by the scheduler loop.
    pub async fn sweep_logged(&self, params: &RewardParams) {
        match self.sweep(params).await {
            Ok(accepted) if accepted > 0 => {
                info!(accepted, "Deposit sweep complete");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Deposit sweep failed; will retry next tick");
                crate::metrics::record_engine_error("sweep");
            }
        }
    }
}

/// Pair USDT transfers with a DHB transfer from the same sender, equal wei
/// value, recognised tier, and a hash not seen before. Pure so the matching
/// rules are testable without IO.
pub fn pair_transfers(
    usdt: &HashMap<String, TokenTransfer>,
    dhb: &HashMap<String, TokenTransfer>,
    known_users: &HashMap<String, User>,
    known_hashes: &HashSet<String>,
    claimed: &mut HashSet<String>,
) -> Vec<DepositCandidate> {
    // Deterministic order: explorer maps are unordered, ingest should not be.
    let mut usdt_transfers: Vec<&TokenTransfer> = usdt.values().collect();
    usdt_transfers.sort_by(|a, b| a.hash.cmp(&b.hash));

    let mut candidates = Vec::new();
    for transfer in usdt_transfers {
        if known_hashes.contains(&transfer.hash) || claimed.contains(&transfer.hash) {
            continue;
        }
        let Some(user) = known_users.get(&transfer.from) else {
            continue;
        };
        let Ok(wei) = money::parse_wei(&transfer.value) else {
            continue;
        };
        let Some(tier) = money::tier_for_wei(wei) else {
            continue;
        };

        // The matching DHB leg: same sender, equal wei value, unused hash.
        let mut dhb_legs: Vec<&TokenTransfer> = dhb
            .values()
            .filter(|d| {
                d.from == transfer.from
                    && d.value == transfer.value
                    && d.hash != transfer.hash
                    && !known_hashes.contains(&d.hash)
                    && !claimed.contains(&d.hash)
            })
            .collect();
        dhb_legs.sort_by(|a, b| a.hash.cmp(&b.hash));
        let Some(dhb_leg) = dhb_legs.first() else {
            continue;
        };

        claimed.insert(transfer.hash.clone());
        claimed.insert(dhb_leg.hash.clone());
        candidates.push(DepositCandidate {
            user_id: user.id,
            usdt_hash: transfer.hash.clone(),
            usdt_wei: transfer.value.clone(),
            dhb_hash: dhb_leg.hash.clone(),
            dhb_wei: dhb_leg.value.clone(),
            tier,
        });
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const LEVEL_1_WEI: &str = "10000000000000000";

    fn transfer(hash: &str, from: &str, value: &str) -> TokenTransfer {
        TokenTransfer {
            hash: hash.to_string(),
            value: value.to_string(),
            from: from.to_string(),
            to: "0xrecv".to_string(),
            token_symbol: String::new(),
        }
    }

    fn transfers(list: Vec<TokenTransfer>) -> HashMap<String, TokenTransfer> {
        list.into_iter().map(|t| (t.hash.clone(), t)).collect()
    }

    fn user(id: i64, address: &str) -> (String, User) {
        (
            address.to_string(),
            User {
                id,
                address: address.to_string(),
                undo: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_pairs_matching_transfers() {
        let usdt = transfers(vec![transfer("0xa", "0xalice", LEVEL_1_WEI)]);
        let dhb = transfers(vec![transfer("0xb", "0xalice", LEVEL_1_WEI)]);
        let known_users = HashMap::from([user(1, "0xalice")]);
        let mut claimed = HashSet::new();

        let candidates =
            pair_transfers(&usdt, &dhb, &known_users, &HashSet::new(), &mut claimed);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.user_id, 1);
        assert_eq!(c.usdt_hash, "0xa");
        assert_eq!(c.dhb_hash, "0xb");
        assert_eq!(c.tier.level, 1);
        assert!(claimed.contains("0xa") && claimed.contains("0xb"));
    }

    #[test]
    fn test_unknown_sender_skipped() {
        let usdt = transfers(vec![transfer("0xa", "0xghost", LEVEL_1_WEI)]);
        let dhb = transfers(vec![transfer("0xb", "0xghost", LEVEL_1_WEI)]);
        let mut claimed = HashSet::new();

        let candidates =
            pair_transfers(&usdt, &dhb, &HashMap::new(), &HashSet::new(), &mut claimed);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_off_tier_amount_skipped() {
        let usdt = transfers(vec![transfer("0xa", "0xalice", "123456789")]);
        let dhb = transfers(vec![transfer("0xb", "0xalice", "123456789")]);
        let known_users = HashMap::from([user(1, "0xalice")]);
        let mut claimed = HashSet::new();

        let candidates =
            pair_transfers(&usdt, &dhb, &known_users, &HashSet::new(), &mut claimed);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_value_mismatch_skipped() {
        let usdt = transfers(vec![transfer("0xa", "0xalice", LEVEL_1_WEI)]);
        let dhb = transfers(vec![transfer("0xb", "0xalice", "20000000000000000")]);
        let known_users = HashMap::from([user(1, "0xalice")]);
        let mut claimed = HashSet::new();

        let candidates =
            pair_transfers(&usdt, &dhb, &known_users, &HashSet::new(), &mut claimed);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_known_hash_skipped() {
        let usdt = transfers(vec![transfer("0xa", "0xalice", LEVEL_1_WEI)]);
        let dhb = transfers(vec![transfer("0xb", "0xalice", LEVEL_1_WEI)]);
        let known_users = HashMap::from([user(1, "0xalice")]);
        let known_hashes = HashSet::from(["0xa".to_string()]);
        let mut claimed = HashSet::new();

        let candidates = pair_transfers(&usdt, &dhb, &known_users, &known_hashes, &mut claimed);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_dhb_leg_used_once() {
        // Two USDT transfers from the same sender but only one DHB leg:
        // exactly one pair forms.
        let usdt = transfers(vec![
            transfer("0xa1", "0xalice", LEVEL_1_WEI),
            transfer("0xa2", "0xalice", LEVEL_1_WEI),
        ]);
        let dhb = transfers(vec![transfer("0xb", "0xalice", LEVEL_1_WEI)]);
        let known_users = HashMap::from([user(1, "0xalice")]);
        let mut claimed = HashSet::new();

        let candidates =
            pair_transfers(&usdt, &dhb, &known_users, &HashSet::new(), &mut claimed);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].dhb_hash, "0xb");
    }

    #[test]
    fn test_senders_do_not_cross_pair() {
        let usdt = transfers(vec![transfer("0xa", "0xalice", LEVEL_1_WEI)]);
        let dhb = transfers(vec![transfer("0xb", "0xbob", LEVEL_1_WEI)]);
        let known_users = HashMap::from([user(1, "0xalice"), user(2, "0xbob")]);
        let mut claimed = HashSet::new();

        let candidates =
            pair_transfers(&usdt, &dhb, &known_users, &HashSet::new(), &mut claimed);
        assert!(candidates.is_empty());
    }
}
