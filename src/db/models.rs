use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub address: String,
    /// Non-zero blocks withdrawals for this user.
    pub undo: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub user_id: i64,
    pub vip: i64,
    pub history_recommend: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserRecommend {
    pub id: i64,
    pub user_id: i64,
    /// Ancestor path: empty for a forest root, else "D{id}" segments from
    /// the top ancestor down to the direct parent.
    pub recommend_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserRecommendArea {
    pub id: i64,
    pub recommend_code: String,
    pub num: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserCurrentMonthRecommend {
    pub id: i64,
    pub user_id: i64,
    pub recommend_user_id: i64,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserBalance {
    pub id: i64,
    pub user_id: i64,
    pub balance_usdt: i64,
    pub balance_dhb: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserBalanceRecord {
    pub id: i64,
    pub user_id: i64,
    /// Post-update balance snapshot for auditability.
    pub balance: i64,
    pub amount: i64,
    pub record_type: String,
    pub coin_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reward {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    /// Absent on house rewards, which move no balance.
    pub balance_record_id: Option<i64>,
    pub reward_type: String,
    pub type_record_id: i64,
    pub reason: String,
    pub reason_location_id: i64,
    pub location_type: String,
    pub created_at: DateTime<Utc>,
}

/// For inserting new rewards
#[derive(Debug, Clone)]
pub struct NewReward {
    pub user_id: i64,
    pub amount: i64,
    pub balance_record_id: Option<i64>,
    pub reward_type: String,
    pub type_record_id: i64,
    pub reason: String,
    pub reason_location_id: i64,
    pub location_type: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub user_id: i64,
    pub status: String,
    pub current_level: i64,
    pub current: i64,
    pub current_max: i64,
    #[sqlx(rename = "row_num")]
    pub row: i64,
    #[sqlx(rename = "col_num")]
    pub col: i64,
    pub stop_date: Option<DateTime<Utc>>,
    /// Book-keeping flag set by the withdrawal engine's compact pass once a
    /// stopped location has been seen.
    pub settled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// For inserting new locations
#[derive(Debug, Clone)]
pub struct NewLocation {
    pub user_id: i64,
    pub current_level: i64,
    pub current_max: i64,
    pub row: i64,
    pub col: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EthUserRecord {
    pub id: i64,
    pub hash: String,
    pub user_id: i64,
    pub status: String,
    pub record_type: String,
    /// Raw on-chain wei amount as a decimal string.
    pub amount: String,
    pub coin_type: String,
    pub created_at: DateTime<Utc>,
}

/// For inserting new on-chain records
#[derive(Debug, Clone)]
pub struct NewEthUserRecord {
    pub hash: String,
    pub user_id: i64,
    pub status: String,
    pub record_type: String,
    pub amount: String,
    pub coin_type: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Withdraw {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    /// Actual reward pool distributed when the ticket was processed.
    pub rel_amount: i64,
    pub status: String,
    pub coin_type: String,
    pub balance_record_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ConfigRow {
    pub id: i64,
    pub key_name: String,
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
