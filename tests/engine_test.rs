//! Scenario tests for the placement and distribution engines.
//!
//! Run with: cargo test --test engine_test -- --ignored --test-threads=1
//!
//! Prerequisites:
//! - A scratch Postgres database
//! - DATABASE_URL set (the schema is migrated and tables are truncated)

use chrono::{TimeZone, Utc};
use sqlx::PgPool;

use dhb_matrix::db::{self, balances, locations, records, users, withdraws};
use dhb_matrix::engine::deposit::{self, DepositCandidate};
use dhb_matrix::engine::{self, monthly_fee, withdraw, PayoutOrigin, RewardParams};
use dhb_matrix::money::{self, DepositTier};
use dhb_matrix::referral;
use dhb_matrix::types::{BalanceRecordType, CoinType, RewardKind, SYSTEM_USER_ID};

const LEVEL_1_WEI: &str = "10000000000000000";
const UNIT: i64 = 10_000_000_000;

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for engine tests");
    let pool = db::create_pool(&url).await.expect("connect");
    db::run_migrations(&pool).await.expect("migrate");
    sqlx::query(
        "TRUNCATE users, user_info, user_recommend, user_recommend_area,
         user_current_month_recommend, user_balance, user_balance_record,
         reward, location, eth_user_record, withdraw RESTART IDENTITY",
    )
    .execute(&pool)
    .await
    .expect("truncate");
    sqlx::query("DELETE FROM config WHERE key_name = 'fee_distributed_month'")
        .execute(&pool)
        .await
        .expect("reset fee month");
    pool
}

/// Register a user the way the authorize endpoint does.
async fn seed_user(pool: &PgPool, address: &str, recommend_code: &str) -> i64 {
    let mut tx = pool.begin().await.unwrap();
    let user = users::create_user(&mut *tx, address).await.unwrap();
    users::create_user_info(&mut *tx, user.id).await.unwrap();
    users::create_user_recommend(&mut *tx, user.id, recommend_code)
        .await
        .unwrap();
    balances::create_user_balance(&mut *tx, user.id).await.unwrap();
    let full = referral::full_code(recommend_code, user.id);
    users::create_recommend_area(&mut *tx, &full).await.unwrap();
    users::increment_recommend_areas(&mut *tx, &referral::ancestor_prefixes(&full))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    user.id
}

fn tier1() -> DepositTier {
    money::tier_for_wei(10_000_000_000_000_000).unwrap()
}

fn candidate(user_id: i64, tag: &str) -> DepositCandidate {
    DepositCandidate {
        user_id,
        usdt_hash: format!("0xusdt{tag}"),
        usdt_wei: LEVEL_1_WEI.to_string(),
        dhb_hash: format!("0xdhb{tag}"),
        dhb_wei: LEVEL_1_WEI.to_string(),
        tier: tier1(),
    }
}

async fn usdt_balance(pool: &PgPool, user_id: i64) -> i64 {
    balances::get_user_balance(pool, user_id)
        .await
        .unwrap()
        .map(|b| b.balance_usdt)
        .unwrap_or(0)
}

#[tokio::test]
#[ignore]
async fn test_first_root_deposit_routes_seed_to_system() {
    let pool = test_pool().await;
    let params = RewardParams::default();
    let u1 = seed_user(&pool, "0x1111111111111111111111111111111111111111", "").await;

    deposit::process_candidate(&pool, &params, &candidate(u1, "1"), Utc::now())
        .await
        .unwrap();

    let location = locations::get_running_location_by_user(&pool, u1)
        .await
        .unwrap()
        .expect("location placed");
    assert_eq!((location.row, location.col), (1, 1));
    assert_eq!(location.current_level, 1);
    assert_eq!(location.current_max, 5_000_000_000_000);
    assert_eq!(location.current, 0);

    // No siblings, no recommender: the whole seed is the house residual.
    let rewards = balances::list_rewards_by_type_record(&pool, "location", location.id)
        .await
        .unwrap();
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].user_id, SYSTEM_USER_ID);
    assert_eq!(rewards[0].reason, "system_reward");
    assert_eq!(rewards[0].amount, 1_000_000_000_000);
    assert!(rewards[0].balance_record_id.is_none());

    assert_eq!(usdt_balance(&pool, u1).await, 1_000_000_000_000);

    // The passive DHB half: wei / 10^8
    let dhb = balances::get_user_balance(&pool, u1)
        .await
        .unwrap()
        .unwrap()
        .balance_dhb;
    assert_eq!(dhb, 100_000_000);
}

#[tokio::test]
#[ignore]
async fn test_referred_second_deposit_pays_row_and_recommender() {
    let pool = test_pool().await;
    let params = RewardParams::default();
    let u1 = seed_user(&pool, "0x1111111111111111111111111111111111111111", "").await;
    let u2 = seed_user(&pool, "0x2222222222222222222222222222222222222222", &format!("D{u1}")).await;

    deposit::process_candidate(&pool, &params, &candidate(u1, "1"), Utc::now())
        .await
        .unwrap();
    deposit::process_candidate(&pool, &params, &candidate(u2, "2"), Utc::now())
        .await
        .unwrap();

    let l2 = locations::get_running_location_by_user(&pool, u2)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((l2.row, l2.col), (1, 2));

    // U1 shares the row (5% of the seed) and earns the 20% first-deposit
    // bonus; vip is still 0 so no vip bonus.
    let l1 = locations::get_running_location_by_user(&pool, u1)
        .await
        .unwrap()
        .unwrap();
    let row_reward = 50_000_000_000;
    let recommend_reward = 200_000_000_000;
    assert_eq!(l1.current, row_reward + recommend_reward);

    let seed = 1_000_000_000_000;
    assert_eq!(
        usdt_balance(&pool, u1).await,
        seed + row_reward + recommend_reward
    );

    let info = users::get_user_info(&pool, u1).await.unwrap().unwrap();
    assert_eq!(info.history_recommend, 1);
    assert_eq!(info.vip, 0);

    // Reward conservation for u2's deposit: granted + residual == seed.
    let rewards = balances::list_rewards_by_type_record(&pool, "location", l2.id)
        .await
        .unwrap();
    let total: i64 = rewards.iter().map(|r| r.amount).sum();
    assert_eq!(total, seed);
    let residual: i64 = rewards
        .iter()
        .filter(|r| r.reason == "system_reward")
        .map(|r| r.amount)
        .sum();
    assert_eq!(residual, seed - row_reward - recommend_reward);
}

#[tokio::test]
#[ignore]
async fn test_second_referral_reaches_vip_one() {
    let pool = test_pool().await;
    let params = RewardParams::default();
    let u1 = seed_user(&pool, "0x1111111111111111111111111111111111111111", "").await;
    let u2 = seed_user(&pool, "0x2222222222222222222222222222222222222222", &format!("D{u1}")).await;
    let u3 = seed_user(&pool, "0x3333333333333333333333333333333333333333", &format!("D{u1}")).await;

    for (user, tag) in [(u1, "1"), (u2, "2"), (u3, "3")] {
        deposit::process_candidate(&pool, &params, &candidate(user, tag), Utc::now())
            .await
            .unwrap();
    }

    // Two accepted first-deposit referrals: history 2, vip 1.
    let info = users::get_user_info(&pool, u1).await.unwrap().unwrap();
    assert_eq!(info.history_recommend, 2);
    assert_eq!(info.vip, 1);

    // u3's deposit paid u1 the vip-1 share on top of row + base bonus.
    let l3 = locations::get_latest_location_by_user(&pool, u3)
        .await
        .unwrap()
        .unwrap();
    let rewards = balances::list_rewards_by_type_record(&pool, "location", l3.id)
        .await
        .unwrap();
    let vip_amount: i64 = rewards
        .iter()
        .filter(|r| r.reason == "recommend_vip")
        .map(|r| r.amount)
        .sum();
    assert_eq!(vip_amount, 40_000_000_000); // 4% of the seed
}

#[tokio::test]
#[ignore]
async fn test_cap_clamp_stops_location() {
    let pool = test_pool().await;
    let u1 = seed_user(&pool, "0x1111111111111111111111111111111111111111", "").await;
    let params = RewardParams::default();
    deposit::process_candidate(&pool, &params, &candidate(u1, "1"), Utc::now())
        .await
        .unwrap();
    let location = locations::get_running_location_by_user(&pool, u1)
        .await
        .unwrap()
        .unwrap();

    // Push the location to 30 units below its cap.
    sqlx::query("UPDATE location SET current = current_max - 30 WHERE id = $1")
        .bind(location.id)
        .execute(&pool)
        .await
        .unwrap();

    // A row payout of 50 must clamp to 30, stop the location, and leave the
    // remaining 20 to the caller's residual.
    let mut tx = pool.begin().await.unwrap();
    let origin = PayoutOrigin {
        kind: RewardKind::Location,
        type_record_id: 0,
    };
    let granted = engine::distribute_to_siblings(&mut tx, origin, location.row, 3, 0, 1000, Utc::now())
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(granted, 30);

    let stopped = locations::get_latest_location_by_user(&pool, u1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stopped.status, "stop");
    assert_eq!(stopped.current, stopped.current_max);
    assert!(stopped.stop_date.is_some());

    let rewards = balances::list_rewards_by_type_record(&pool, "location", 0)
        .await
        .unwrap();
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].amount, 30);
}

#[tokio::test]
#[ignore]
async fn test_hash_replay_is_a_noop() {
    let pool = test_pool().await;
    let params = RewardParams::default();
    let u1 = seed_user(&pool, "0x1111111111111111111111111111111111111111", "").await;

    let c = candidate(u1, "1");
    deposit::process_candidate(&pool, &params, &c, Utc::now())
        .await
        .unwrap();
    let balance_before = usdt_balance(&pool, u1).await;

    let err = deposit::process_candidate(&pool, &params, &c, Utc::now())
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    assert_eq!(usdt_balance(&pool, u1).await, balance_before);
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM eth_user_record")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 2); // one USDT + one DHB row, no duplicates

    let known = records::get_known_hashes(&pool, &[c.usdt_hash.clone(), c.dhb_hash.clone()])
        .await
        .unwrap();
    assert_eq!(known.len(), 2);
}

#[tokio::test]
#[ignore]
async fn test_withdrawal_distribution() {
    let pool = test_pool().await;
    let params = RewardParams::default();
    let u1 = seed_user(&pool, "0x1111111111111111111111111111111111111111", "").await;
    deposit::process_candidate(&pool, &params, &candidate(u1, "1"), Utc::now())
        .await
        .unwrap();

    // Ticket for 10 USDT (10^11 units); balance already holds the seed.
    let amount = 10 * UNIT;
    let mut tx = pool.begin().await.unwrap();
    let record_id = balances::debit(&mut tx, u1, amount, CoinType::Usdt, BalanceRecordType::Withdraw)
        .await
        .unwrap();
    let ticket = withdraws::create_withdraw(&mut *tx, u1, amount, CoinType::Usdt, record_id)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(ticket.status, "");

    let processed = withdraw::run_once(&pool, &params, Utc::now()).await.unwrap();
    assert_eq!(processed, 1);

    let fee = amount * 5 / 100;
    let pool_value = (amount - fee) * 50 / 100;

    let rewards = balances::list_rewards_by_type_record(&pool, "withdraw", ticket.id)
        .await
        .unwrap();
    let fee_total: i64 = rewards
        .iter()
        .filter(|r| r.reason == "system_fee")
        .map(|r| r.amount)
        .sum();
    assert_eq!(fee_total, fee);

    // No siblings and no recommender: the whole pool is the house residual.
    let residual: i64 = rewards
        .iter()
        .filter(|r| r.reason == "system_reward")
        .map(|r| r.amount)
        .sum();
    assert_eq!(residual, pool_value);

    let done: (String, i64) =
        sqlx::query_as("SELECT status, rel_amount FROM withdraw WHERE id = $1")
            .bind(ticket.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(done.0, "rewarded");
    assert_eq!(done.1, pool_value);
}

#[tokio::test]
#[ignore]
async fn test_dhb_withdrawal_passes_without_rewards() {
    let pool = test_pool().await;
    let params = RewardParams::default();
    let u1 = seed_user(&pool, "0x1111111111111111111111111111111111111111", "").await;
    deposit::process_candidate(&pool, &params, &candidate(u1, "1"), Utc::now())
        .await
        .unwrap();

    let amount = 1_000_000; // DHB units from the paired deposit
    let mut tx = pool.begin().await.unwrap();
    let record_id = balances::debit(&mut tx, u1, amount, CoinType::Dhb, BalanceRecordType::Withdraw)
        .await
        .unwrap();
    let ticket = withdraws::create_withdraw(&mut *tx, u1, amount, CoinType::Dhb, record_id)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    withdraw::run_once(&pool, &params, Utc::now()).await.unwrap();

    let status: (String,) = sqlx::query_as("SELECT status FROM withdraw WHERE id = $1")
        .bind(ticket.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status.0, "pass");

    let rewards = balances::list_rewards_by_type_record(&pool, "withdraw", ticket.id)
        .await
        .unwrap();
    assert!(rewards.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_monthly_fee_distribution() {
    let pool = test_pool().await;
    let params = RewardParams::default();

    // Pretend "now" is 2026-08-01; the distribution settles July.
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 1, 0, 0).unwrap();
    let july = Utc.with_ymd_and_hms(2026, 7, 10, 0, 0, 0).unwrap();

    // Three qualifying recommenders; the third never deposits.
    let mut qualified = Vec::new();
    for (i, addr) in [
        "0x1111111111111111111111111111111111111111",
        "0x2222222222222222222222222222222222222222",
        "0x3333333333333333333333333333333333333333",
    ]
    .iter()
    .enumerate()
    {
        let user = seed_user(&pool, addr, "").await;
        if i < 2 {
            deposit::process_candidate(&pool, &params, &candidate(user, &i.to_string()), Utc::now())
                .await
                .unwrap();
        }
        for n in 0..5 {
            users::create_month_recommend(&pool, user, 1000 + n, july)
                .await
                .unwrap();
        }
        qualified.push(user);
    }

    // July's house fees total 10^12.
    sqlx::query(
        "INSERT INTO reward (user_id, amount, reward_type, type_record_id, reason,
             reason_location_id, location_type, created_at)
         VALUES ($1, $2, 'withdraw', 0, 'system_fee', 0, '', $3)",
    )
    .bind(SYSTEM_USER_ID)
    .bind(1_000_000_000_000_i64)
    .bind(july)
    .execute(&pool)
    .await
    .unwrap();

    // The second deposit already paid a row share into the first location,
    // so compare currents before and after the distribution.
    let mut before = Vec::new();
    for user in &qualified[..2] {
        let location = locations::get_running_location_by_user(&pool, *user)
            .await
            .unwrap()
            .unwrap();
        before.push(location.current);
    }

    let paid = monthly_fee::run_once(&pool, now).await.unwrap();
    assert_eq!(paid, 2); // the user with no running location is skipped

    let share = 1_000_000_000_000_i64 / 100 / 3;
    for (i, user) in qualified[..2].iter().enumerate() {
        let location = locations::get_running_location_by_user(&pool, *user)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(location.current - before[i], share);
        let fee_rewards: i64 = balances::list_rewards_by_type_record(&pool, "fee", location.id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.amount)
            .sum();
        assert_eq!(fee_rewards, share);
    }

    // A second run inside the same month is a no-op.
    let again = monthly_fee::run_once(&pool, now).await.unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
#[ignore]
async fn test_placement_enumeration_across_users() {
    let pool = test_pool().await;
    let params = RewardParams::default();

    let mut expected = Vec::new();
    for i in 0..7 {
        let addr = format!("0x{:040x}", i + 1);
        let user = seed_user(&pool, &addr, "").await;
        deposit::process_candidate(&pool, &params, &candidate(user, &i.to_string()), Utc::now())
            .await
            .unwrap();
        expected.push(((i / 3 + 1) as i64, (i % 3 + 1) as i64));
    }

    let placed: Vec<(i64, i64)> =
        sqlx::query_as("SELECT row_num, col_num FROM location ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(placed, expected);
}
