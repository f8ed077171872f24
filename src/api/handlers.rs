use std::collections::HashMap;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{bearer_user, display_time, page_bounds, require_scheduler, AppState};
use crate::db::{balances, configs, locations, users, withdraws};
use crate::engine::RewardParams;
use crate::error::AppError;
use crate::money;
use crate::referral::{self, InviteCode};
use crate::types::{BalanceRecordType, CoinType};

fn validate_address(address: &str) -> Result<(), AppError> {
    let hex_part = address
        .strip_prefix("0x")
        .filter(|rest| rest.len() == 40 && rest.bytes().all(|b| b.is_ascii_hexdigit()));
    if hex_part.is_none() {
        return Err(AppError::InvalidInput(format!(
            "malformed address: {address:?}"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct EthAuthorizeRequest {
    pub address: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct EthAuthorizeReply {
    pub token: String,
}

/// Create the user on first contact (valid referral code required) and hand
/// out a bearer token.
pub async fn eth_authorize(
    State(state): State<AppState>,
    Json(req): Json<EthAuthorizeRequest>,
) -> Result<Json<EthAuthorizeReply>, AppError> {
    let address = req.address.trim();
    validate_address(address)?;

    let user = match users::get_user_by_address(&state.pool, address).await? {
        Some(user) => user,
        None => register_user(&state, address, &req.code).await?,
    };

    let token = auth_token(&state, user.id)?;
    Ok(Json(EthAuthorizeReply { token }))
}

fn auth_token(state: &AppState, user_id: i64) -> Result<String, AppError> {
    crate::auth::create_token(user_id, &state.config.auth.jwt_secret)
}

async fn register_user(
    state: &AppState,
    address: &str,
    code: &str,
) -> Result<crate::db::models::User, AppError> {
    let invite = referral::decode_invite_code(code)?;
    let parent = match invite {
        InviteCode::Root => None,
        InviteCode::Parent(parent_id) => Some(
            users::get_user_recommend(&state.pool, parent_id)
                .await?
                .ok_or_else(|| AppError::InvalidInput("invalid referral code".to_string()))?,
        ),
    };

    let mut tx = state.pool.begin().await?;
    let user = users::create_user(&mut *tx, address).await?;
    users::create_user_info(&mut *tx, user.id).await?;
    let recommend_code = match &parent {
        None => String::new(),
        Some(p) => referral::child_code(&p.recommend_code, p.user_id),
    };
    users::create_user_recommend(&mut *tx, user.id, &recommend_code).await?;
    balances::create_user_balance(&mut *tx, user.id).await?;

    let full_code = referral::full_code(&recommend_code, user.id);
    users::create_recommend_area(&mut *tx, &full_code).await?;
    users::increment_recommend_areas(&mut *tx, &referral::ancestor_prefixes(&full_code)).await?;
    tx.commit().await?;

    info!(user_id = user.id, address, "User registered");
    Ok(user)
}

#[derive(Debug, Serialize)]
pub struct DepositReply {
    pub accepted: u32,
}

/// Scheduler-only: trigger one chain-poller sweep.
pub async fn deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DepositReply>, AppError> {
    require_scheduler(&state, &headers)?;
    let params = RewardParams::load(&state.pool).await?;
    let accepted = state.poller.sweep(&params).await?;
    Ok(Json(DepositReply { accepted }))
}

#[derive(Debug, Serialize)]
pub struct UserInfoReply {
    pub address: String,
    pub invite_code: String,
    pub balance_usdt: String,
    pub balance_dhb: String,
    pub location_status: String,
    pub location_level: i64,
    pub location_current: String,
    pub location_current_max: String,
    pub amount_to_cap: String,
    pub recommender_address: String,
    pub row_count: i64,
    pub col_count: i64,
    pub team_size: i64,
    pub totals: HashMap<String, String>,
    pub level1_dhb: String,
    pub level2_dhb: String,
    pub level3_dhb: String,
    pub receive_address: String,
    pub usdt_contract: String,
    pub dhb_contract: String,
}

pub async fn user_info(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserInfoReply>, AppError> {
    let user_id = bearer_user(&state, &headers)?;
    let user = users::get_user_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))?;

    let balance = balances::get_user_balance(&state.pool, user_id).await?;
    let (balance_usdt, balance_dhb) = balance
        .map(|b| (b.balance_usdt, b.balance_dhb))
        .unwrap_or((0, 0));

    let running = locations::get_running_location_by_user(&state.pool, user_id).await?;
    let (status, level, current, current_max, row_count, col_count) = match &running {
        Some(l) => (
            l.status.clone(),
            l.current_level,
            l.current,
            l.current_max,
            locations::count_locations_in_row(&state.pool, l.row).await?,
            locations::count_locations_in_col(&state.pool, l.col).await?,
        ),
        None => (String::new(), 0, 0, 0, 0, 0),
    };

    let recommend = users::get_user_recommend(&state.pool, user_id).await?;
    let recommender_address = match recommend
        .as_ref()
        .and_then(|r| referral::direct_recommender(&r.recommend_code))
    {
        Some(id) => users::get_user_by_id(&state.pool, id)
            .await?
            .map(|u| u.address)
            .unwrap_or_default(),
        None => String::new(),
    };
    let team_size = match &recommend {
        Some(r) => {
            let full = referral::full_code(&r.recommend_code, user_id);
            users::count_subtree(&state.pool, &full).await?
        }
        None => 0,
    };

    let totals = balances::reward_totals_by_reason(&state.pool, user_id)
        .await?
        .into_iter()
        .map(|(reason, total)| (reason, money::format_units(total)))
        .collect();

    let level_keys: Vec<String> = vec![
        "level1Dhb".to_string(),
        "level2Dhb".to_string(),
        "level3Dhb".to_string(),
    ];
    let levels = configs::get_configs_by_keys(&state.pool, &level_keys).await?;
    let level_value = |key: &str| levels.get(key).cloned().unwrap_or_default();

    Ok(Json(UserInfoReply {
        address: user.address,
        invite_code: referral::invite_code_for(user_id),
        balance_usdt: money::format_units(balance_usdt),
        balance_dhb: money::format_units(balance_dhb),
        location_status: status,
        location_level: level,
        location_current: money::format_units(current),
        location_current_max: money::format_units(current_max),
        amount_to_cap: money::format_units(current_max - current),
        recommender_address,
        row_count,
        col_count,
        team_size,
        totals,
        level1_dhb: level_value("level1Dhb"),
        level2_dhb: level_value("level2Dhb"),
        level3_dhb: level_value("level3Dhb"),
        receive_address: state.config.explorer.receive_address.clone(),
        usdt_contract: state.config.explorer.usdt_contract.clone(),
        dhb_contract: state.config.explorer.dhb_contract.clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RewardListRequest {
    #[serde(default)]
    pub location_type: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RewardItem {
    pub id: i64,
    pub amount: String,
    pub reason: String,
    pub location_type: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct RewardListReply {
    pub total: i64,
    pub rewards: Vec<RewardItem>,
}

fn reward_items(rewards: Vec<crate::db::models::Reward>) -> Vec<RewardItem> {
    rewards
        .into_iter()
        .map(|r| RewardItem {
            id: r.id,
            amount: money::format_units(r.amount),
            reason: r.reason,
            location_type: r.location_type,
            created_at: display_time(r.created_at),
        })
        .collect()
}

/// Location payouts, optionally filtered to the row or column flavour.
pub async fn reward_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RewardListRequest>,
) -> Result<Json<RewardListReply>, AppError> {
    let user_id = bearer_user(&state, &headers)?;
    if let Some(lt) = req.location_type.as_deref() {
        if lt != "row" && lt != "col" {
            return Err(AppError::InvalidInput(format!(
                "unknown location_type: {lt:?}"
            )));
        }
    }
    let (limit, offset) = page_bounds(req.page);
    let location_type = req.location_type.as_deref();
    let total = balances::count_location_rewards(&state.pool, user_id, location_type).await?;
    let rewards =
        balances::list_location_rewards(&state.pool, user_id, location_type, limit, offset)
            .await?;
    Ok(Json(RewardListReply {
        total,
        rewards: reward_items(rewards),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PagedRequest {
    #[serde(default)]
    pub page: Option<i64>,
}

async fn rewards_by_reasons(
    state: &AppState,
    user_id: i64,
    reasons: &[&str],
    page: Option<i64>,
) -> Result<RewardListReply, AppError> {
    let reasons: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
    let (limit, offset) = page_bounds(page);
    let total = balances::count_rewards_by_reasons(&state.pool, user_id, &reasons).await?;
    let rewards =
        balances::list_rewards_by_reasons(&state.pool, user_id, &reasons, limit, offset).await?;
    Ok(RewardListReply {
        total,
        rewards: reward_items(rewards),
    })
}

pub async fn recommend_reward_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PagedRequest>,
) -> Result<Json<RewardListReply>, AppError> {
    let user_id = bearer_user(&state, &headers)?;
    let reply =
        rewards_by_reasons(&state, user_id, &["recommend", "recommend_vip"], req.page).await?;
    Ok(Json(reply))
}

pub async fn fee_reward_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PagedRequest>,
) -> Result<Json<RewardListReply>, AppError> {
    let user_id = bearer_user(&state, &headers)?;
    let reply = rewards_by_reasons(&state, user_id, &["fee"], req.page).await?;
    Ok(Json(reply))
}

#[derive(Debug, Serialize)]
pub struct WithdrawItem {
    pub id: i64,
    pub amount: String,
    pub rel_amount: String,
    pub status: String,
    #[serde(rename = "type")]
    pub coin_type: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct WithdrawListReply {
    pub total: i64,
    pub withdraws: Vec<WithdrawItem>,
}

pub async fn withdraw_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PagedRequest>,
) -> Result<Json<WithdrawListReply>, AppError> {
    let user_id = bearer_user(&state, &headers)?;
    let (limit, offset) = page_bounds(req.page);
    let total = withdraws::count_withdraws_by_user(&state.pool, user_id).await?;
    let tickets = withdraws::list_withdraws_by_user(&state.pool, user_id, limit, offset).await?;
    Ok(Json(WithdrawListReply {
        total,
        withdraws: tickets
            .into_iter()
            .map(|w| WithdrawItem {
                id: w.id,
                amount: money::format_units(w.amount),
                rel_amount: money::format_units(w.rel_amount),
                status: w.status,
                coin_type: w.coin_type,
                created_at: display_time(w.created_at),
            })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    /// Decimal amount string, e.g. "12.5".
    pub amount: String,
    #[serde(rename = "type")]
    pub coin_type: String,
}

#[derive(Debug, Serialize)]
pub struct WithdrawReply {
    pub id: i64,
    pub status: String,
}

/// Create a withdrawal ticket. The balance is debited immediately; the
/// withdrawal engine distributes rewards later.
pub async fn withdraw(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<WithdrawReply>, AppError> {
    let user_id = bearer_user(&state, &headers)?;
    let coin = CoinType::parse(&req.coin_type)
        .ok_or_else(|| AppError::InvalidInput(format!("unknown coin type: {:?}", req.coin_type)))?;
    let amount = money::parse_units(&req.amount)?;
    if amount <= 0 {
        return Err(AppError::InvalidInput("amount must be positive".to_string()));
    }

    let user = users::get_user_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))?;
    if user.undo > 0 {
        return Err(AppError::Forbidden("withdrawals are blocked for this user".to_string()));
    }

    let mut tx = state.pool.begin().await?;
    let balance_record_id =
        balances::debit(&mut tx, user_id, amount, coin, BalanceRecordType::Withdraw).await?;
    let ticket = withdraws::create_withdraw(&mut *tx, user_id, amount, coin, balance_record_id).await?;
    tx.commit().await?;

    info!(user_id, ticket_id = ticket.id, amount, coin = %coin, "Withdrawal ticket created");
    Ok(Json(WithdrawReply {
        id: ticket.id,
        status: ticket.status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("0xe865f2e5ff04b8b7952d1c0d9163a91f313b158f").is_ok());
        assert!(validate_address("0xE865F2E5FF04B8B7952D1C0D9163A91F313B158F").is_ok());
        assert!(validate_address("").is_err());
        assert!(validate_address("e865f2e5ff04b8b7952d1c0d9163a91f313b158f").is_err());
        assert!(validate_address("0xzz65f2e5ff04b8b7952d1c0d9163a91f313b158f").is_err());
        assert!(validate_address("0xe865").is_err());
    }
}
