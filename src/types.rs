use std::fmt;

/// Reward rows credited to the house carry this sentinel user id in storage.
/// It never leaves the db layer; everywhere else the beneficiary is typed.
pub const SYSTEM_USER_ID: i64 = 999_999_999;

/// Who a reward row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beneficiary {
    User(i64),
    System,
}

impl Beneficiary {
    pub fn storage_id(&self) -> i64 {
        match self {
            Beneficiary::User(id) => *id,
            Beneficiary::System => SYSTEM_USER_ID,
        }
    }

    pub fn from_storage_id(id: i64) -> Self {
        if id == SYSTEM_USER_ID {
            Beneficiary::System
        } else {
            Beneficiary::User(id)
        }
    }
}

/// Coin leg of a balance movement or withdrawal ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinType {
    Usdt,
    Dhb,
}

impl CoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoinType::Usdt => "usdt",
            CoinType::Dhb => "dhb",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "usdt" => Some(CoinType::Usdt),
            "dhb" => Some(CoinType::Dhb),
            _ => None,
        }
    }
}

impl fmt::Display for CoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Location lifecycle. Single-shot: running locations stop exactly when
/// `current` reaches `current_max` and never come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationStatus {
    Running,
    Stop,
}

impl LocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationStatus::Running => "running",
            LocationStatus::Stop => "stop",
        }
    }
}

/// Withdrawal ticket lifecycle. Tickets are created with the blank status;
/// the operator console moves `rewarded`/`pass` tickets to `success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawStatus {
    Created,
    Doing,
    Pass,
    Rewarded,
    Success,
}

impl WithdrawStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawStatus::Created => "",
            WithdrawStatus::Doing => "doing",
            WithdrawStatus::Pass => "pass",
            WithdrawStatus::Rewarded => "rewarded",
            WithdrawStatus::Success => "success",
        }
    }
}

/// Balance record audit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceRecordType {
    Deposit,
    Withdraw,
    Reward,
}

impl BalanceRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceRecordType::Deposit => "deposit",
            BalanceRecordType::Withdraw => "withdraw",
            BalanceRecordType::Reward => "reward",
        }
    }
}

/// The action that produced a reward row (`reward.reward_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardKind {
    Location,
    Withdraw,
    Fee,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Location => "location",
            RewardKind::Withdraw => "withdraw",
            RewardKind::Fee => "fee",
        }
    }
}

/// Why the beneficiary was paid (`reward.reason`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardReason {
    Location,
    Recommend,
    RecommendVip,
    SystemReward,
    SystemFee,
    Fee,
}

impl RewardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardReason::Location => "location",
            RewardReason::Recommend => "recommend",
            RewardReason::RecommendVip => "recommend_vip",
            RewardReason::SystemReward => "system_reward",
            RewardReason::SystemFee => "system_fee",
            RewardReason::Fee => "fee",
        }
    }
}

/// Row/column flavour of a sibling payout (`reward.location_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingKind {
    Row,
    Col,
}

impl SiblingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiblingKind::Row => "row",
            SiblingKind::Col => "col",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beneficiary_sentinel_roundtrip() {
        assert_eq!(Beneficiary::System.storage_id(), SYSTEM_USER_ID);
        assert_eq!(Beneficiary::User(7).storage_id(), 7);
        assert_eq!(Beneficiary::from_storage_id(SYSTEM_USER_ID), Beneficiary::System);
        assert_eq!(Beneficiary::from_storage_id(7), Beneficiary::User(7));
    }

    #[test]
    fn test_coin_type_parse() {
        assert_eq!(CoinType::parse("usdt"), Some(CoinType::Usdt));
        assert_eq!(CoinType::parse("dhb"), Some(CoinType::Dhb));
        assert_eq!(CoinType::parse("USDT"), None);
        assert_eq!(CoinType::parse(""), None);
    }

    #[test]
    fn test_withdraw_status_blank() {
        assert_eq!(WithdrawStatus::Created.as_str(), "");
        assert_eq!(WithdrawStatus::Rewarded.as_str(), "rewarded");
    }
}
